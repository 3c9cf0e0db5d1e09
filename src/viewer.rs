use std::fmt;
use std::path::{Path, PathBuf};

use eframe::egui;

use crate::dicom::PixelFrame;
use crate::presets::Preset;
use crate::scan::ScanReport;
use crate::series::ImageSeries;
use crate::view::ViewState;
use crate::windowing::WindowLevel;

const FALLBACK_WINDOW: WindowLevel = WindowLevel {
    center: 40.0,
    width: 400.0,
};

/// What happens to window, zoom and pan when the user moves to another file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationViewPolicy {
    #[default]
    Reset,
    Preserve,
}

impl NavigationViewPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Preserve => "preserve",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reset" => Some(Self::Reset),
            "preserve" | "keep" => Some(Self::Preserve),
            _ => None,
        }
    }
}

impl fmt::Display for NavigationViewPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum FrameStatus {
    Empty,
    Loading,
    Ready(PixelFrame),
    Failed(String),
}

/// A file the caller should hand to the frame loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeTarget {
    pub index: usize,
    pub path: PathBuf,
}

/// Everything the viewer shows, independent of egui.
///
/// Navigation methods return a [`DecodeTarget`] only when the current index
/// actually changed. `image_revision` advances whenever the rendered image
/// would look different, so the UI knows when to rebuild its texture.
#[derive(Debug, Clone)]
pub struct ViewerState {
    directory: Option<PathBuf>,
    series: ImageSeries,
    skipped: usize,
    view: ViewState,
    status: FrameStatus,
    selected_preset: Option<Preset>,
    show_metadata: bool,
    policy: NavigationViewPolicy,
    message: Option<String>,
    reset_on_next_frame: bool,
    image_revision: u64,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new(NavigationViewPolicy::default())
    }
}

impl ViewerState {
    pub fn new(policy: NavigationViewPolicy) -> Self {
        Self {
            directory: None,
            series: ImageSeries::default(),
            skipped: 0,
            view: ViewState::new(FALLBACK_WINDOW),
            status: FrameStatus::Empty,
            selected_preset: None,
            show_metadata: true,
            policy,
            message: None,
            reset_on_next_frame: true,
            image_revision: 0,
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn series(&self) -> &ImageSeries {
        &self.series
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn status(&self) -> &FrameStatus {
        &self.status
    }

    pub fn frame(&self) -> Option<&PixelFrame> {
        match &self.status {
            FrameStatus::Ready(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn selected_preset(&self) -> Option<Preset> {
        self.selected_preset
    }

    pub fn show_metadata(&self) -> bool {
        self.show_metadata
    }

    pub fn policy(&self) -> NavigationViewPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: NavigationViewPolicy) {
        self.policy = policy;
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn image_revision(&self) -> u64 {
        self.image_revision
    }

    pub fn has_series(&self) -> bool {
        !self.series.is_empty()
    }

    /// Enters the viewer on a freshly scanned directory.
    pub fn open_scan(&mut self, report: ScanReport, start_index: Option<usize>) -> Option<DecodeTarget> {
        let ScanReport {
            directory,
            series,
            skipped,
        } = report;

        self.message = Some(if skipped > 0 {
            format!(
                "Loaded {} image(s) from {} ({} file(s) skipped).",
                series.len(),
                directory.display(),
                skipped
            )
        } else {
            format!("Loaded {} image(s) from {}.", series.len(), directory.display())
        });
        self.directory = Some(directory);
        self.series = series;
        self.skipped = skipped;
        self.selected_preset = None;
        self.reset_on_next_frame = true;
        self.view.reset_transform();
        self.bump_revision();

        if let Some(index) = start_index {
            if !self.series.seek(index) && index >= self.series.len() {
                log::warn!(
                    "Start index {index} is outside the series of {} image(s)",
                    self.series.len()
                );
            }
        }
        self.begin_decode()
    }

    /// Leaves the viewer and shows `message`.
    pub fn scan_failed(&mut self, message: impl Into<String>) {
        self.close();
        self.message = Some(message.into());
    }

    pub fn close(&mut self) {
        self.directory = None;
        self.series = ImageSeries::default();
        self.skipped = 0;
        self.status = FrameStatus::Empty;
        self.selected_preset = None;
        self.message = None;
        self.reset_on_next_frame = true;
        self.view = ViewState::new(FALLBACK_WINDOW);
        self.bump_revision();
    }

    pub fn next(&mut self) -> Option<DecodeTarget> {
        let moved = self.series.next();
        self.after_navigation(moved)
    }

    pub fn previous(&mut self) -> Option<DecodeTarget> {
        let moved = self.series.previous();
        self.after_navigation(moved)
    }

    pub fn first(&mut self) -> Option<DecodeTarget> {
        let moved = self.series.first();
        self.after_navigation(moved)
    }

    pub fn last(&mut self) -> Option<DecodeTarget> {
        let moved = self.series.last();
        self.after_navigation(moved)
    }

    pub fn seek(&mut self, index: usize) -> Option<DecodeTarget> {
        let moved = self.series.seek(index);
        self.after_navigation(moved)
    }

    pub fn step(&mut self, delta: i64) -> Option<DecodeTarget> {
        let moved = self.series.step(delta);
        self.after_navigation(moved)
    }

    /// Decode target for the current file, e.g. to retry after a failure.
    pub fn reload(&mut self) -> Option<DecodeTarget> {
        self.begin_decode()
    }

    pub fn frame_loaded(&mut self, index: usize, frame: PixelFrame) {
        if self.series.index() != Some(index) {
            log::debug!("Ignoring decoded frame for index {index}; current is {:?}", self.series.index());
            return;
        }

        if self.reset_on_next_frame || self.policy == NavigationViewPolicy::Reset {
            self.view.reset(frame.default_window);
            self.selected_preset = None;
            self.reset_on_next_frame = false;
        }
        self.status = FrameStatus::Ready(frame);
        self.bump_revision();
    }

    pub fn frame_failed(&mut self, index: usize, message: impl Into<String>) {
        if self.series.index() != Some(index) {
            return;
        }
        self.status = FrameStatus::Failed(message.into());
        self.bump_revision();
    }

    pub fn set_window_center(&mut self, center: f32) {
        if center.is_finite() && center != self.view.window.center {
            self.view.set_window_center(center);
            self.selected_preset = None;
            self.bump_revision();
        }
    }

    pub fn set_window_width(&mut self, width: f32) {
        if !width.is_finite() {
            return;
        }
        let before = self.view.window;
        self.view.set_window_width(width);
        if self.view.window != before {
            self.selected_preset = None;
            self.bump_revision();
        }
    }

    pub fn apply_preset(&mut self, preset: Preset) {
        self.view.window = preset.window();
        self.selected_preset = Some(preset);
        self.bump_revision();
    }

    /// Back to the file's own window with identity zoom and pan.
    pub fn reset_view(&mut self) {
        let default_window = self
            .frame()
            .map(|frame| frame.default_window)
            .unwrap_or(self.view.window);
        self.view.reset(default_window);
        self.selected_preset = None;
        self.bump_revision();
    }

    pub fn reset_zoom_pan(&mut self) {
        self.view.reset_transform();
    }

    pub fn zoom_in(&mut self) {
        self.view.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.view.zoom_out();
    }

    pub fn zoom_about(&mut self, factor: f32, anchor: egui::Vec2) {
        self.view.zoom_about(factor, anchor);
    }

    pub fn pan_by(&mut self, delta: egui::Vec2) {
        self.view.pan_by(delta);
    }

    pub fn clamp_pan(&mut self, canvas: egui::Rect, image_size: egui::Vec2) {
        self.view.clamp_pan(canvas, image_size);
    }

    pub fn toggle_metadata(&mut self) {
        self.show_metadata = !self.show_metadata;
    }

    pub fn metadata(&self) -> Option<&[(String, String)]> {
        self.frame().map(|frame| frame.metadata.as_slice())
    }

    /// One-line summary of where the user is, for the status bar.
    pub fn position_summary(&self) -> String {
        let Some(entry) = self.series.current() else {
            return "No directory loaded".to_string();
        };
        let mut text = format!("{}  {}", self.series.position_text(), entry.file_name);
        if self.skipped > 0 {
            text.push_str(&format!("  ({} skipped)", self.skipped));
        }
        text
    }

    fn after_navigation(&mut self, moved: bool) -> Option<DecodeTarget> {
        if !moved {
            return None;
        }
        self.begin_decode()
    }

    fn begin_decode(&mut self) -> Option<DecodeTarget> {
        let index = self.series.index()?;
        let path = self.series.current_path()?.to_path_buf();
        self.status = FrameStatus::Loading;
        Some(DecodeTarget { index, path })
    }

    fn bump_revision(&mut self) {
        self.image_revision = self.image_revision.wrapping_add(1);
    }
}
