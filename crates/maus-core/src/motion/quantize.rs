//! L4 Atomic Layer: Pixel quantization
//!
//! Only whole pixels are posted. The fraction stays in the motion state and
//! is carried into the next frame.

/// Whole pixels contained in `position`, truncated toward zero
///
/// Truncation under-emits rather than over-emits: `2.9 -> 2`, `-2.9 -> -2`.
/// Values beyond the i64 range saturate.
#[inline]
pub fn whole_pixels(position: f64) -> i64 {
    position.trunc() as i64
}

/// Split `position` into the whole pixels to emit and the remainder to keep
#[inline]
pub fn split(position: f64) -> (i64, f64) {
    let pixels = whole_pixels(position);
    (pixels, position - pixels as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_toward_zero() {
        let (pixels, rest) = split(2.9);
        assert_eq!(pixels, 2);
        assert!((rest - 0.9).abs() < 1e-12);

        let (pixels, rest) = split(-2.9);
        assert_eq!(pixels, -2);
        assert!((rest + 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_sub_pixel_emits_nothing() {
        assert_eq!(whole_pixels(0.999), 0);
        assert_eq!(whole_pixels(-0.999), 0);
    }

    #[test]
    fn test_saturates() {
        assert_eq!(whole_pixels(1e30), i64::MAX);
        assert_eq!(whole_pixels(-1e30), i64::MIN);
    }
}
