use eframe::egui::{Color32, ColorImage};

use crate::dicom::{FrameSamples, PixelFrame};
use crate::windowing::WindowLevel;

/// Produces the displayable image for `frame`. Monochrome frames go through
/// rescale and `window`; color frames are shown as stored.
pub fn render_frame(frame: &PixelFrame, window: WindowLevel) -> ColorImage {
    match &frame.samples {
        FrameSamples::Monochrome(samples) => render_window_level(frame, samples, window),
        FrameSamples::Rgb {
            samples,
            samples_per_pixel,
        } => render_rgb(frame.width, frame.height, samples, *samples_per_pixel),
    }
}

fn render_window_level(frame: &PixelFrame, samples: &[i32], window: WindowLevel) -> ColorImage {
    let mut pixels = Vec::with_capacity(samples.len());
    for &sample in samples {
        let mut gray = window.gray(frame.modality_value(sample));
        if frame.invert {
            gray = 255 - gray;
        }
        pixels.push(Color32::from_gray(gray));
    }

    ColorImage {
        size: [frame.width, frame.height],
        pixels,
    }
}

pub fn render_rgb(
    width_px: usize,
    height_px: usize,
    frame_pixels: &[u8],
    samples_per_pixel: u16,
) -> ColorImage {
    let spp = samples_per_pixel.max(1) as usize;
    let pixel_count = width_px.saturating_mul(height_px);
    let mut pixels = Vec::with_capacity(pixel_count);

    for chunk in frame_pixels.chunks_exact(spp).take(pixel_count) {
        let r = chunk[0];
        let g = if spp > 1 { chunk[1] } else { r };
        let b = if spp > 2 { chunk[2] } else { r };
        pixels.push(Color32::from_rgb(r, g, b));
    }

    if pixels.len() < pixel_count {
        pixels.resize(pixel_count, Color32::BLACK);
    }

    ColorImage {
        size: [width_px, height_px],
        pixels,
    }
}
