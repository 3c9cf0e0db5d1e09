/// Smallest window width accepted by the mapping.
pub const MIN_WINDOW_WIDTH: f32 = 1.0;

/// Linear contrast window over modality values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    pub center: f32,
    pub width: f32,
}

impl WindowLevel {
    pub fn new(center: f32, width: f32) -> Self {
        Self {
            center,
            width: clamp_width(width),
        }
    }

    pub fn effective_width(&self) -> f32 {
        clamp_width(self.width)
    }

    /// Lower and upper modality values of the window.
    pub fn bounds(&self) -> (f32, f32) {
        let width = self.effective_width();
        let low = self.center - width / 2.0;
        (low, low + width)
    }

    /// Maps a modality value into `[0, 1]`.
    pub fn normalize(&self, value: f32) -> f32 {
        let (low, high) = self.bounds();
        if value <= low {
            0.0
        } else if value >= high {
            1.0
        } else {
            (value - low) / self.effective_width()
        }
    }

    pub fn gray(&self, value: f32) -> u8 {
        (self.normalize(value) * 255.0).round() as u8
    }
}

fn clamp_width(width: f32) -> f32 {
    // f32::max ignores a NaN operand.
    width.max(MIN_WINDOW_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_outside_window_saturate() {
        let window = WindowLevel::new(40.0, 400.0);
        assert_eq!(window.normalize(-160.0), 0.0);
        assert_eq!(window.normalize(-1000.0), 0.0);
        assert_eq!(window.normalize(240.0), 1.0);
        assert_eq!(window.normalize(3000.0), 1.0);
        assert!((window.normalize(40.0) - 0.5).abs() < 1e-6);
        assert!((window.normalize(-60.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn output_is_bounded_and_monotonic() {
        for &(center, width) in &[(40.0, 400.0), (-600.0, 1500.0), (35.0, 30.0), (0.0, 1.0)] {
            let window = WindowLevel::new(center, width);
            let mut previous = f32::NEG_INFINITY;
            let mut value = -3000.0_f32;
            while value <= 3000.0 {
                let mapped = window.normalize(value);
                assert!((0.0..=1.0).contains(&mapped), "{mapped} out of range");
                assert!(mapped >= previous, "not monotonic at {value}");
                previous = mapped;
                value += 7.5;
            }
        }
    }

    #[test]
    fn zero_and_nan_width_are_clamped() {
        let zero = WindowLevel::new(100.0, 0.0);
        assert_eq!(zero.width, MIN_WINDOW_WIDTH);
        assert!(zero.normalize(100.0).is_finite());

        let literal = WindowLevel {
            center: 100.0,
            width: 0.0,
        };
        assert_eq!(literal.normalize(99.0), 0.0);
        assert_eq!(literal.normalize(101.0), 1.0);

        let nan = WindowLevel::new(0.0, f32::NAN);
        assert_eq!(nan.width, MIN_WINDOW_WIDTH);
    }

    #[test]
    fn gray_scales_to_full_byte_range() {
        let window = WindowLevel::new(127.5, 255.0);
        assert_eq!(window.gray(0.0), 0);
        assert_eq!(window.gray(255.0), 255);
        assert_eq!(window.gray(127.5), 128);
    }
}
