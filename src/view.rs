use eframe::egui;

use crate::windowing::WindowLevel;

pub const ZOOM_MIN: f32 = 0.25;
pub const ZOOM_MAX: f32 = 4.0;
pub const ZOOM_STEP: f32 = 0.25;

/// Presentation parameters for the displayed frame. None of these touch the
/// decoded pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub window: WindowLevel,
    pub zoom: f32,
    pub pan: egui::Vec2,
}

impl ViewState {
    pub fn new(window: WindowLevel) -> Self {
        Self {
            window,
            zoom: 1.0,
            pan: egui::Vec2::ZERO,
        }
    }

    pub fn set_window_center(&mut self, center: f32) {
        self.window = WindowLevel::new(center, self.window.width);
    }

    pub fn set_window_width(&mut self, width: f32) {
        self.window = WindowLevel::new(self.window.center, width);
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(ZOOM_MIN, ZOOM_MAX);
        }
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - ZOOM_STEP);
    }

    /// Multiplies the zoom while keeping the point at `anchor` (relative to the
    /// current image center) fixed on screen.
    pub fn zoom_about(&mut self, factor: f32, anchor: egui::Vec2) {
        let old_zoom = self.zoom;
        self.set_zoom(old_zoom * factor);
        if (self.zoom - old_zoom).abs() <= f32::EPSILON {
            return;
        }
        let ratio = self.zoom / old_zoom;
        self.pan += anchor * (1.0 - ratio);
    }

    pub fn pan_by(&mut self, delta: egui::Vec2) {
        if delta.x.is_finite() && delta.y.is_finite() {
            self.pan += delta;
        }
    }

    pub fn reset_transform(&mut self) {
        self.zoom = 1.0;
        self.pan = egui::Vec2::ZERO;
    }

    pub fn reset(&mut self, default_window: WindowLevel) {
        self.window = default_window;
        self.reset_transform();
    }

    /// Screen rect of an image of `image_size` pixels drawn into `canvas`.
    pub fn image_rect(&self, canvas: egui::Rect, image_size: egui::Vec2) -> egui::Rect {
        let draw_size = fitted_size(canvas, image_size) * self.zoom;
        egui::Rect::from_center_size(canvas.center() + self.pan, draw_size)
    }

    /// On an axis where the image fits, keeps it inside the canvas. On a larger
    /// axis, stops an image edge from passing the canvas center.
    pub fn clamp_pan(&mut self, canvas: egui::Rect, image_size: egui::Vec2) {
        let draw_size = fitted_size(canvas, image_size) * self.zoom;
        let max_x = pan_limit(draw_size.x, canvas.width());
        let max_y = pan_limit(draw_size.y, canvas.height());
        self.pan.x = self.pan.x.clamp(-max_x, max_x);
        self.pan.y = self.pan.y.clamp(-max_y, max_y);
    }
}

fn pan_limit(draw: f32, canvas: f32) -> f32 {
    if draw <= canvas {
        (canvas - draw) * 0.5
    } else {
        draw * 0.5
    }
}

fn fitted_size(canvas: egui::Rect, image_size: egui::Vec2) -> egui::Vec2 {
    if image_size.x <= 0.0 || image_size.y <= 0.0 {
        return egui::Vec2::ZERO;
    }
    let fit_scale = (canvas.width() / image_size.x)
        .min(canvas.height() / image_size.y)
        .max(0.01);
    image_size * fit_scale
}
