use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use eframe::egui::{self, Sense, TextureHandle, TextureOptions};

use crate::dicom::METADATA_FIELD_NAMES;
use crate::launch::LaunchRequest;
use crate::loader::{FrameLoader, LoadEvent};
use crate::presets::Preset;
use crate::renderer::render_frame;
use crate::scan::{scan_directory, ScanError, ScanReport};
use crate::settings::{default_visible_metadata_fields, settings_file_path, Settings};
use crate::viewer::{DecodeTarget, FrameStatus, NavigationViewPolicy, ViewerState};
use crate::windowing::MIN_WINDOW_WIDTH;

pub const APP_TITLE: &str = "dicomscope";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const POLL_INTERVAL: Duration = Duration::from_millis(16);
const MAX_WINDOW_WIDTH: f32 = 100_000.0;

/// How the app was started: what to open and what to show first.
#[derive(Debug, Clone, Default)]
pub struct Startup {
    pub launch: Option<LaunchRequest>,
    pub initial_directory: Option<PathBuf>,
    pub keep_view: bool,
    pub status: Option<String>,
}

/// Options carried from a scan request to the moment its first frame shows.
#[derive(Debug, Clone, Copy, Default)]
struct ScanOptions {
    start_index: Option<usize>,
    preset: Option<Preset>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UiAction {
    Browse,
    Scan,
    First,
    Previous,
    Next,
    Last,
    Seek(usize),
    Step(i64),
    SetCenter(f32),
    SetWidth(f32),
    ApplyPreset(Preset),
    ZoomIn,
    ZoomOut,
    ResetZoom,
    ResetView,
    ToggleMetadata,
    SetPolicy(NavigationViewPolicy),
    Retry,
}

pub struct DicomScopeApp {
    state: ViewerState,
    loader: FrameLoader,
    settings: Settings,
    settings_path: Option<PathBuf>,
    path_input: String,
    scan_receiver: Option<Receiver<Result<ScanReport, ScanError>>>,
    scan_options: ScanOptions,
    pending_preset: Option<Preset>,
    pending_launch: Option<LaunchRequest>,
    texture: Option<TextureHandle>,
    rendered_revision: Option<u64>,
    scroll_accum: f32,
}

impl DicomScopeApp {
    pub fn new(settings: Settings, startup: Startup) -> Self {
        let policy = if startup.keep_view {
            NavigationViewPolicy::Preserve
        } else {
            settings.navigation_view
        };
        let mut state = ViewerState::new(policy);
        if let Some(status) = startup.status {
            state.set_message(status);
        }

        let path_input = startup
            .launch
            .as_ref()
            .map(|request| request.directory.clone())
            .or(startup.initial_directory)
            .map(|dir| dir.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            state,
            loader: FrameLoader::new(),
            settings,
            settings_path: settings_file_path(),
            path_input,
            scan_receiver: None,
            scan_options: ScanOptions::default(),
            pending_preset: None,
            pending_launch: startup.launch,
            texture: None,
            rendered_revision: None,
            scroll_accum: 0.0,
        }
    }

    fn apply_black_background(ctx: &egui::Context) {
        let mut visuals = egui::Visuals::dark();
        let line_base = egui::Color32::from_gray(28);
        let line_hover = egui::Color32::from_gray(42);
        let line_active = egui::Color32::from_gray(56);

        visuals.panel_fill = egui::Color32::from_gray(8);
        visuals.window_fill = egui::Color32::BLACK;
        visuals.extreme_bg_color = egui::Color32::BLACK;
        visuals.window_stroke = egui::Stroke::new(1.0, line_base);
        visuals.widgets.noninteractive.bg_stroke = egui::Stroke::new(1.0, line_base);
        visuals.widgets.inactive.bg_stroke = egui::Stroke::new(1.0, line_base);
        visuals.widgets.hovered.bg_stroke = egui::Stroke::new(1.0, line_hover);
        visuals.widgets.active.bg_stroke = egui::Stroke::new(1.0, line_active);
        ctx.set_visuals(visuals);
    }

    fn persist_settings(&self) {
        let Some(path) = self.settings_path.as_deref() else {
            return;
        };
        if let Err(err) = self.settings.save_to(path) {
            log::warn!("{err:#}");
        }
    }

    fn is_busy(&self) -> bool {
        self.scan_receiver.is_some() || self.loader.is_loading()
    }

    fn start_scan(&mut self, directory: PathBuf, options: ScanOptions) {
        self.path_input = directory.to_string_lossy().to_string();
        self.loader.cancel();
        self.scan_options = options;
        self.pending_preset = None;
        self.state
            .set_message(format!("Scanning {}...", directory.display()));

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(scan_directory(&directory));
        });
        // Replacing the receiver drops any scan still running.
        self.scan_receiver = Some(rx);
    }

    fn browse_for_directory(&mut self) {
        let mut dialog = rfd::FileDialog::new();
        if let Some(dir) = self.state.directory() {
            dialog = dialog.set_directory(dir);
        }
        if let Some(dir) = dialog.pick_folder() {
            self.start_scan(dir, ScanOptions::default());
        }
    }

    fn poll_scan(&mut self) {
        let Some(receiver) = self.scan_receiver.take() else {
            return;
        };

        match receiver.try_recv() {
            Ok(Ok(report)) => {
                let options = std::mem::take(&mut self.scan_options);
                self.settings.last_directory = Some(report.directory.clone());
                self.persist_settings();
                self.path_input = report.directory.to_string_lossy().to_string();
                self.pending_preset = options.preset;
                let target = self.state.open_scan(report, options.start_index);
                self.request_decode(target);
            }
            Ok(Err(err)) => {
                log::warn!("{err}");
                self.loader.cancel();
                self.pending_preset = None;
                self.state.scan_failed(err.to_string());
            }
            Err(TryRecvError::Empty) => self.scan_receiver = Some(receiver),
            Err(TryRecvError::Disconnected) => {
                self.state
                    .scan_failed("Directory scan stopped before it finished.");
            }
        }
    }

    fn poll_loader(&mut self) {
        while let Some(event) = self.loader.poll() {
            match event {
                LoadEvent::Loaded { index, frame } => {
                    self.state.frame_loaded(index, frame);
                    if let Some(preset) = self.pending_preset.take() {
                        self.state.apply_preset(preset);
                    }
                }
                LoadEvent::Failed {
                    index,
                    path,
                    message,
                } => {
                    log::debug!("Showing decode failure for {}", path.display());
                    self.state.frame_failed(index, message);
                }
            }
        }
    }

    fn request_decode(&mut self, target: Option<DecodeTarget>) {
        if let Some(DecodeTarget { index, path }) = target {
            self.loader.request(index, path);
        }
    }

    fn sync_texture(&mut self, ctx: &egui::Context) {
        let revision = self.state.image_revision();
        if self.rendered_revision == Some(revision) {
            return;
        }
        self.rendered_revision = Some(revision);

        match self.state.status() {
            FrameStatus::Ready(frame) => {
                let color_image = render_frame(frame, self.state.view().window);
                if let Some(texture) = self.texture.as_mut() {
                    texture.set(color_image, TextureOptions::LINEAR);
                } else {
                    self.texture =
                        Some(ctx.load_texture("dicom-image", color_image, TextureOptions::LINEAR));
                }
            }
            // Keep showing the previous image until the next one arrives.
            FrameStatus::Loading => {}
            FrameStatus::Empty | FrameStatus::Failed(_) => self.texture = None,
        }
    }

    fn apply_action(&mut self, action: UiAction) {
        match action {
            UiAction::Browse => self.browse_for_directory(),
            UiAction::Scan => {
                let text = self.path_input.trim().to_string();
                self.start_scan(PathBuf::from(text), ScanOptions::default());
            }
            UiAction::First => {
                let target = self.state.first();
                self.request_decode(target);
            }
            UiAction::Previous => {
                let target = self.state.previous();
                self.request_decode(target);
            }
            UiAction::Next => {
                let target = self.state.next();
                self.request_decode(target);
            }
            UiAction::Last => {
                let target = self.state.last();
                self.request_decode(target);
            }
            UiAction::Seek(index) => {
                let target = self.state.seek(index);
                self.request_decode(target);
            }
            UiAction::Step(delta) => {
                let target = self.state.step(delta);
                self.request_decode(target);
            }
            UiAction::Retry => {
                let target = self.state.reload();
                self.request_decode(target);
            }
            UiAction::SetCenter(center) => self.state.set_window_center(center),
            UiAction::SetWidth(width) => self.state.set_window_width(width),
            UiAction::ApplyPreset(preset) => self.state.apply_preset(preset),
            UiAction::ZoomIn => self.state.zoom_in(),
            UiAction::ZoomOut => self.state.zoom_out(),
            UiAction::ResetZoom => self.state.reset_zoom_pan(),
            UiAction::ResetView => self.state.reset_view(),
            UiAction::ToggleMetadata => self.state.toggle_metadata(),
            UiAction::SetPolicy(policy) => {
                self.state.set_policy(policy);
                self.settings.navigation_view = policy;
                self.persist_settings();
            }
        }
    }

    fn keyboard_actions(ctx: &egui::Context) -> Vec<UiAction> {
        if ctx.wants_keyboard_input() {
            return Vec::new();
        }

        let mut actions = Vec::new();
        ctx.input_mut(|input| {
            let mut pressed = |key: egui::Key, action: UiAction| {
                if input.consume_key(egui::Modifiers::NONE, key) {
                    actions.push(action);
                }
            };
            pressed(egui::Key::ArrowLeft, UiAction::Previous);
            pressed(egui::Key::PageUp, UiAction::Previous);
            pressed(egui::Key::ArrowRight, UiAction::Next);
            pressed(egui::Key::PageDown, UiAction::Next);
            pressed(egui::Key::Home, UiAction::First);
            pressed(egui::Key::End, UiAction::Last);
            pressed(egui::Key::Plus, UiAction::ZoomIn);
            pressed(egui::Key::Equals, UiAction::ZoomIn);
            pressed(egui::Key::Minus, UiAction::ZoomOut);
            pressed(egui::Key::Num0, UiAction::ResetZoom);
            pressed(egui::Key::R, UiAction::ResetView);
            pressed(egui::Key::M, UiAction::ToggleMetadata);
        });
        actions
    }

    fn show_toolbar(&mut self, ui: &mut egui::Ui, actions: &mut Vec<UiAction>) {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new(format!("{APP_TITLE} v{APP_VERSION}")).strong());
            ui.separator();
            ui.label("Folder");
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.path_input)
                    .hint_text("Path to a folder of DICOM files")
                    .desired_width((ui.available_width() - 360.0).max(160.0)),
            );
            if response.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter)) {
                actions.push(UiAction::Scan);
            }
            if ui.button("Browse...").clicked() {
                actions.push(UiAction::Browse);
            }
            let can_scan = !self.path_input.trim().is_empty() && self.scan_receiver.is_none();
            if ui.add_enabled(can_scan, egui::Button::new("Scan")).clicked() {
                actions.push(UiAction::Scan);
            }

            ui.separator();
            ui.menu_button("Metadata Fields", |ui| {
                self.show_metadata_field_options_menu(ui);
            });
            let metadata_label = if self.state.show_metadata() {
                "Hide Metadata (M)"
            } else {
                "Show Metadata (M)"
            };
            if ui.button(metadata_label).clicked() {
                actions.push(UiAction::ToggleMetadata);
            }

            let mut keep_view = self.state.policy() == NavigationViewPolicy::Preserve;
            if ui
                .checkbox(&mut keep_view, "Keep view")
                .on_hover_text("Keep window, zoom and pan when moving between images")
                .changed()
            {
                actions.push(UiAction::SetPolicy(if keep_view {
                    NavigationViewPolicy::Preserve
                } else {
                    NavigationViewPolicy::Reset
                }));
            }
        });
    }

    fn show_metadata_field_options_menu(&mut self, ui: &mut egui::Ui) {
        let visible = &mut self.settings.visible_metadata_fields;
        let mut changed = false;
        ui.horizontal(|ui| {
            if ui.small_button("All").clicked() {
                *visible = default_visible_metadata_fields();
                changed = true;
            }
            if ui.small_button("None").clicked() {
                visible.clear();
                changed = true;
            }
        });
        ui.add_space(4.0);
        egui::ScrollArea::vertical()
            .id_salt("metadata-fields-menu")
            .max_height(260.0)
            .show(ui, |ui| {
                for field in METADATA_FIELD_NAMES {
                    let mut checked = visible.contains(*field);
                    if ui.checkbox(&mut checked, *field).changed() {
                        if checked {
                            visible.insert((*field).to_string());
                        } else {
                            visible.remove(*field);
                        }
                        changed = true;
                    }
                }
            });
        if changed {
            self.persist_settings();
        }
    }

    fn show_navigation_row(&self, ui: &mut egui::Ui, actions: &mut Vec<UiAction>) {
        let series = self.state.series();
        let Some(mut index) = series.index() else {
            return;
        };
        let last = series.last_index();

        ui.horizontal(|ui| {
            if ui
                .add_enabled(index > 0, egui::Button::new("⏮"))
                .on_hover_text("First image (Home)")
                .clicked()
            {
                actions.push(UiAction::First);
            }
            if ui
                .add_enabled(index > 0, egui::Button::new("◀ Prev"))
                .on_hover_text("Previous image (Left / Page Up)")
                .clicked()
            {
                actions.push(UiAction::Previous);
            }

            let slider_width = (ui.available_width() - 220.0).max(120.0);
            ui.spacing_mut().slider_width = slider_width;
            if ui
                .add_enabled(last > 0, egui::Slider::new(&mut index, 0..=last).show_value(false))
                .changed()
            {
                actions.push(UiAction::Seek(index));
            }

            if ui
                .add_enabled(index < last, egui::Button::new("Next ▶"))
                .on_hover_text("Next image (Right / Page Down)")
                .clicked()
            {
                actions.push(UiAction::Next);
            }
            if ui
                .add_enabled(index < last, egui::Button::new("⏭"))
                .on_hover_text("Last image (End)")
                .clicked()
            {
                actions.push(UiAction::Last);
            }
            ui.monospace(series.position_text());
        });
    }

    fn show_window_row(&self, ui: &mut egui::Ui, actions: &mut Vec<UiAction>) {
        let view = self.state.view();
        let frame = self.state.frame();
        let monochrome = frame.map(|frame| frame.is_monochrome()).unwrap_or(false);

        ui.horizontal(|ui| {
            ui.add_enabled_ui(monochrome, |ui| {
                let mut center = view.window.center;
                ui.label("WL");
                if ui
                    .add(egui::DragValue::new(&mut center).speed(1.0).max_decimals(1))
                    .on_hover_text("Window level (center)")
                    .changed()
                {
                    actions.push(UiAction::SetCenter(center));
                }

                let mut width = view.window.width;
                ui.label("WW");
                if ui
                    .add(
                        egui::DragValue::new(&mut width)
                            .speed(1.0)
                            .max_decimals(1)
                            .range(MIN_WINDOW_WIDTH..=MAX_WINDOW_WIDTH),
                    )
                    .on_hover_text("Window width")
                    .changed()
                {
                    actions.push(UiAction::SetWidth(width));
                }
            });
            if let Some(frame) = frame.filter(|frame| frame.is_monochrome()) {
                ui.weak(format!(
                    "Range {:.0} to {:.0}",
                    frame.min_value, frame.max_value
                ));
            }

            ui.separator();
            if ui.button("−").on_hover_text("Zoom out (-)").clicked() {
                actions.push(UiAction::ZoomOut);
            }
            ui.monospace(format!("{:>4.0}%", view.zoom * 100.0));
            if ui.button("+").on_hover_text("Zoom in (+)").clicked() {
                actions.push(UiAction::ZoomIn);
            }
            if ui.button("1:1").on_hover_text("Reset zoom and pan (0)").clicked() {
                actions.push(UiAction::ResetZoom);
            }
            ui.separator();
            if ui
                .button("Reset View")
                .on_hover_text("Restore the image's own window, zoom and pan (R)")
                .clicked()
            {
                actions.push(UiAction::ResetView);
            }
            if let Some(preset) = self.state.selected_preset() {
                ui.label(format!("Preset: {}", preset.name()));
            }
        });
    }

    fn show_preset_row(&self, ui: &mut egui::Ui, actions: &mut Vec<UiAction>) {
        let selected = self.state.selected_preset();
        let enabled = self
            .state
            .frame()
            .map(|frame| frame.is_monochrome())
            .unwrap_or(false);
        ui.add_enabled_ui(enabled, |ui| {
            ui.horizontal_wrapped(|ui| {
                for preset in Preset::ALL {
                    let (center, width) = preset.center_width();
                    if ui
                        .selectable_label(selected == Some(preset), preset.name())
                        .on_hover_text(format!(
                            "{}\nWL {center} / WW {width}",
                            preset.description()
                        ))
                        .clicked()
                    {
                        actions.push(UiAction::ApplyPreset(preset));
                    }
                }
            });
        });
    }

    fn show_metadata_panel(&self, ui: &mut egui::Ui) {
        ui.heading("Metadata");
        ui.separator();
        let Some(metadata) = self.state.metadata() else {
            ui.label("No image loaded.");
            return;
        };
        if let Some(frame) = self.state.frame() {
            let file_name = frame
                .path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            ui.strong(file_name)
                .on_hover_text(frame.path.display().to_string());
            ui.add_space(4.0);
        }

        egui::ScrollArea::vertical()
            .id_salt("metadata-panel-scroll")
            .show(ui, |ui| {
                let mut shown_count = 0usize;
                egui::Grid::new("metadata-grid")
                    .num_columns(2)
                    .striped(true)
                    .show(ui, |ui| {
                        for (key, value) in metadata {
                            if !self.settings.visible_metadata_fields.contains(key.as_str()) {
                                continue;
                            }
                            shown_count = shown_count.saturating_add(1);
                            ui.monospace(key);
                            ui.label(value);
                            ui.end_row();
                        }
                    });
                if shown_count == 0 {
                    ui.label("No metadata fields selected.");
                }
            });
    }

    fn show_file_list(&self, ui: &mut egui::Ui, actions: &mut Vec<UiAction>) {
        let series = self.state.series();
        ui.heading(format!("Files ({})", series.len()));
        ui.separator();
        let current = series.index();
        let row_height = ui.spacing().interact_size.y;
        egui::ScrollArea::vertical()
            .id_salt("file-list-scroll")
            .auto_shrink([false, false])
            .show_rows(ui, row_height, series.len(), |ui, rows| {
                for index in rows {
                    let Some(entry) = series.entries().get(index) else {
                        continue;
                    };
                    let response = ui
                        .selectable_label(current == Some(index), &entry.file_name)
                        .on_hover_text(entry.path.display().to_string());
                    if response.clicked() {
                        actions.push(UiAction::Seek(index));
                    }
                }
            });
    }

    fn show_canvas(&mut self, ui: &mut egui::Ui, actions: &mut Vec<UiAction>) {
        let available = ui.available_size();
        let (canvas_rect, response) = ui.allocate_exact_size(available, Sense::click_and_drag());
        if !canvas_rect.is_positive() {
            return;
        }
        let painter = ui.painter_at(canvas_rect);

        if let Some(texture) = self.texture.clone() {
            let image_size = texture.size_vec2();
            if response.double_clicked() {
                actions.push(UiAction::ResetZoom);
            }
            if response.dragged() {
                self.state.pan_by(response.drag_delta());
            }

            if response.hovered() {
                let (modifiers, zoom_delta, raw_scroll, smooth_scroll) = ui.input(|input| {
                    (
                        input.modifiers,
                        input.zoom_delta(),
                        input.raw_scroll_delta,
                        input.smooth_scroll_delta,
                    )
                });
                let scroll = dominant_scroll_axis(raw_scroll, smooth_scroll);
                let factor = if modifiers.shift {
                    let step = step_from_scroll(&mut self.scroll_accum, scroll);
                    if step != 0 {
                        actions.push(UiAction::Step(step));
                    }
                    1.0
                } else if (zoom_delta - 1.0).abs() > f32::EPSILON {
                    zoom_delta
                } else {
                    (scroll * 0.0015).exp()
                };
                if (factor - 1.0).abs() > f32::EPSILON {
                    let anchor = response
                        .hover_pos()
                        .map(|pointer| pointer - (canvas_rect.center() + self.state.view().pan))
                        .unwrap_or(egui::Vec2::ZERO);
                    self.state.zoom_about(factor, anchor);
                }
            }

            self.state.clamp_pan(canvas_rect, image_size);
            let image_rect = self.state.view().image_rect(canvas_rect, image_size);
            painter.image(
                texture.id(),
                image_rect,
                egui::Rect::from_min_max(egui::Pos2::ZERO, egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }

        let overlay = match self.state.status() {
            FrameStatus::Loading => Some(("Loading image...".to_string(), ui.visuals().text_color())),
            FrameStatus::Failed(message) => Some((message.clone(), ui.visuals().error_fg_color)),
            FrameStatus::Empty if self.scan_receiver.is_some() => {
                Some(("Scanning directory...".to_string(), ui.visuals().text_color()))
            }
            FrameStatus::Empty => Some((
                "Choose a folder of DICOM files to start.".to_string(),
                ui.visuals().weak_text_color(),
            )),
            FrameStatus::Ready(_) => None,
        };
        if let Some((text, color)) = overlay {
            let galley = painter.layout(
                text,
                egui::FontId::proportional(16.0),
                color,
                (canvas_rect.width() - 40.0).max(120.0),
            );
            let position = canvas_rect.center() - galley.size() * 0.5;
            if self.texture.is_some() {
                painter.rect_filled(
                    egui::Rect::from_min_size(position, galley.size()).expand(8.0),
                    4.0,
                    egui::Color32::from_black_alpha(180),
                );
            }
            painter.galley(position, galley, color);
        }

        if matches!(self.state.status(), FrameStatus::Failed(_)) {
            let button_rect = egui::Rect::from_center_size(
                canvas_rect.center() + egui::vec2(0.0, 40.0),
                egui::vec2(80.0, 24.0),
            );
            if ui.put(button_rect, egui::Button::new("Retry")).clicked() {
                actions.push(UiAction::Retry);
            }
        }
    }

    fn show_status_line(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if self.is_busy() {
                ui.spinner();
            }
            if let Some(message) = self.state.message() {
                ui.label(message);
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.monospace(self.state.position_summary());
            });
        });
    }
}

impl eframe::App for DicomScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        Self::apply_black_background(ctx);

        if let Some(request) = self.pending_launch.take() {
            let LaunchRequest {
                directory,
                preset,
                start_index,
            } = request;
            self.start_scan(directory, ScanOptions { start_index, preset });
        }

        self.poll_scan();
        self.poll_loader();

        let mut actions = Self::keyboard_actions(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.add_space(2.0);
            self.show_toolbar(ui, &mut actions);
            ui.add_space(2.0);
        });

        egui::TopBottomPanel::bottom("status-line").show(ctx, |ui| {
            self.show_status_line(ui);
        });

        if self.state.has_series() {
            egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
                ui.add_space(4.0);
                self.show_navigation_row(ui, &mut actions);
                self.show_window_row(ui, &mut actions);
                self.show_preset_row(ui, &mut actions);
                ui.add_space(4.0);
            });

            egui::SidePanel::right("file-list")
                .resizable(true)
                .default_width(200.0)
                .show(ctx, |ui| {
                    self.show_file_list(ui, &mut actions);
                });

            if self.state.show_metadata() {
                egui::SidePanel::left("metadata")
                    .resizable(true)
                    .default_width(300.0)
                    .show(ctx, |ui| {
                        self.show_metadata_panel(ui);
                    });
            }
        }

        // Window edits from this frame's widgets must reach the texture before it is drawn.
        for action in actions.drain(..) {
            self.apply_action(action);
        }
        self.sync_texture(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                self.show_canvas(ui, &mut actions);
            });
        for action in actions {
            self.apply_action(action);
        }

        if self.is_busy() {
            ctx.set_cursor_icon(egui::CursorIcon::Progress);
            ctx.request_repaint_after(POLL_INTERVAL);
        }
    }
}

fn dominant_scroll_axis(raw_scroll: egui::Vec2, smooth_scroll: egui::Vec2) -> f32 {
    let pick = |delta: egui::Vec2| {
        if delta.y.abs() >= delta.x.abs() {
            delta.y
        } else {
            delta.x
        }
    };

    if smooth_scroll != egui::Vec2::ZERO {
        pick(smooth_scroll)
    } else {
        pick(raw_scroll)
    }
}

/// Turns Shift+wheel movement into whole image steps. Scrolling up moves back
/// through the series.
fn step_from_scroll(scroll_accum: &mut f32, scroll: f32) -> i64 {
    const DEAD_ZONE: f32 = 0.5;
    const PIXELS_PER_STEP: f32 = 30.0;

    if scroll.abs() <= DEAD_ZONE {
        return 0;
    }

    // Drop leftovers when the direction flips.
    if *scroll_accum != 0.0 && scroll.signum() != scroll_accum.signum() {
        *scroll_accum = 0.0;
    }
    *scroll_accum += scroll;

    let steps = (*scroll_accum / PIXELS_PER_STEP).trunc();
    if steps == 0.0 {
        return 0;
    }
    *scroll_accum -= steps * PIXELS_PER_STEP;
    -(steps as i64)
}

/// Directory to pre-fill when no launch target was given: `DICOMSCOPE_DIR`
/// first, then the last directory that scanned successfully.
pub fn initial_directory(env_dir: Option<OsString>, settings: &Settings) -> Option<PathBuf> {
    env_dir
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| settings.last_directory.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;

    use crate::testing::{scratch_dir, write_slice, SliceSpec};

    fn pump_until(app: &mut DicomScopeApp, ctx: &egui::Context, done: impl Fn(&DicomScopeApp) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            app.poll_scan();
            app.poll_loader();
            app.sync_texture(ctx);
            if done(app) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for the viewer");
    }

    fn test_app(startup: Startup) -> DicomScopeApp {
        let mut app = DicomScopeApp::new(Settings::default(), startup);
        app.settings_path = None;
        app
    }

    fn frame_ready(app: &DicomScopeApp) -> bool {
        matches!(app.state.status(), FrameStatus::Ready(_))
    }

    #[test]
    fn initial_directory_prefers_environment() {
        let settings = Settings {
            last_directory: Some(PathBuf::from("/data/last")),
            ..Settings::default()
        };
        assert_eq!(
            initial_directory(Some(OsString::from("/data/env")), &settings),
            Some(PathBuf::from("/data/env"))
        );
        assert_eq!(
            initial_directory(Some(OsString::new()), &settings),
            Some(PathBuf::from("/data/last"))
        );
        assert_eq!(initial_directory(None, &Settings::default()), None);
    }

    #[test]
    fn shift_scroll_steps_through_series() {
        let mut accum = 0.0;
        assert_eq!(step_from_scroll(&mut accum, 0.3), 0);
        assert_eq!(step_from_scroll(&mut accum, 20.0), 0);
        assert_eq!(step_from_scroll(&mut accum, 20.0), -1);
        assert_eq!(accum, 10.0);
        assert_eq!(step_from_scroll(&mut accum, -65.0), 2);
        assert_eq!(accum, -5.0);
        assert_eq!(
            dominant_scroll_axis(egui::vec2(0.0, 3.0), egui::vec2(-12.0, 4.0)),
            -12.0
        );
        assert_eq!(dominant_scroll_axis(egui::vec2(1.0, -2.0), egui::Vec2::ZERO), -2.0);
    }

    #[test]
    fn keep_view_flag_overrides_settings_policy() {
        let app = test_app(Startup {
            keep_view: true,
            initial_directory: Some(PathBuf::from("/data/ct")),
            ..Startup::default()
        });
        assert_eq!(app.state.policy(), NavigationViewPolicy::Preserve);
        assert_eq!(app.path_input, "/data/ct");
    }

    #[test]
    fn scan_decode_and_navigate_fixture_directory() {
        let dir = scratch_dir("app-flow");
        for (index, name) in ["s1.dcm", "s2.dcm", "s3.dcm"].into_iter().enumerate() {
            let spec = SliceSpec {
                position: Some([0.0, 0.0, index as f64 * 2.5]),
                seed: index as i32 + 1,
                ..SliceSpec::default()
            };
            write_slice(&dir, name, &spec);
        }

        let ctx = egui::Context::default();
        let mut app = test_app(Startup::default());
        app.start_scan(
            dir.clone(),
            ScanOptions {
                start_index: Some(1),
                preset: Some(Preset::Bone),
            },
        );
        pump_until(&mut app, &ctx, frame_ready);

        assert_eq!(app.state.series().len(), 3);
        assert_eq!(app.state.series().index(), Some(1));
        assert_eq!(app.state.selected_preset(), Some(Preset::Bone));
        assert!(app.texture.is_some());

        app.apply_action(UiAction::Next);
        assert!(matches!(app.state.status(), FrameStatus::Loading));
        pump_until(&mut app, &ctx, frame_ready);
        assert_eq!(app.state.series().index(), Some(2));
        assert_eq!(app.state.selected_preset(), None);

        app.apply_action(UiAction::Next);
        assert!(frame_ready(&app));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn failed_scan_reports_message() {
        let dir = scratch_dir("app-empty");
        let ctx = egui::Context::default();
        let mut app = test_app(Startup::default());
        app.start_scan(dir.clone(), ScanOptions::default());
        pump_until(&mut app, &ctx, |app| app.scan_receiver.is_none());

        assert!(!app.state.has_series());
        assert!(app
            .state
            .message()
            .unwrap_or_default()
            .starts_with("No valid DICOM files found"));
        assert!(app.texture.is_none());

        let _ = fs::remove_dir_all(dir);
    }
}
