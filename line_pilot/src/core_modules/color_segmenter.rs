// THEORY:
// The `ColorSegmenter` is the first stage of every cycle. It answers one
// question per pixel, "is this the paint I am following?", and hands a clean
// binary mask to the line extractors.
//
// Algorithm steps:
// 1.  **Classification**: Every pixel is converted to 8-bit HSV and tested
//     against each range of the active `ColorProfile`. Ranges are unioned, so
//     red's two wrap-around windows behave like one color.
// 2.  **Cleanup**: A fixed 3x3 closing followed by a 3x3 opening removes
//     sensor speckle and fills small gaps in worn paint.
// 3.  **Stateless Utility**: Same frame and profile in, bit-identical mask out.
//     An empty mask is a normal answer (no line in view), not an error.

use crate::core_modules::color_profile::ColorProfile;
use crate::core_modules::frame::Frame;
use crate::core_modules::mask::Mask;

/// Raw per-pixel classification without noise cleanup.
pub fn classify(frame: &Frame, profile: &ColorProfile) -> Mask {
    Mask::from_fn(frame.width(), frame.height(), |x, y| {
        profile.matches(frame.pixel(x, y).to_hsv())
    })
}

/// Produces the cleaned binary mask of `profile`'s color in `frame`.
pub fn segment(frame: &Frame, profile: &ColorProfile) -> Mask {
    let raw = classify(frame, profile);
    if raw.is_empty() {
        return raw;
    }
    raw.close().open()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color_profile::builtin_profiles;
    use image::{Rgb, RgbImage};

    fn profile(name: &str) -> ColorProfile {
        builtin_profiles()
            .into_iter()
            .find(|p| p.name == name)
            .expect("builtin profile")
    }

    fn striped_frame() -> Frame {
        // Grey floor with a vertical red stripe in columns 20..30 and a lone
        // red speck far from it.
        let mut image = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));
        for y in 0..48 {
            for x in 20..30 {
                image.put_pixel(x, y, Rgb([210, 25, 20]));
            }
        }
        image.put_pixel(55, 5, Rgb([210, 25, 20]));
        Frame::new(image)
    }

    #[test]
    fn no_matching_pixels_gives_an_empty_mask() {
        let frame = striped_frame();
        let mask = segment(&frame, &profile("blue"));
        assert!(mask.is_empty());
    }

    #[test]
    fn stripe_survives_and_speck_is_removed() {
        let frame = striped_frame();
        let mask = segment(&frame, &profile("red"));
        assert_eq!(mask.count(), 10 * 48);
        assert!(!mask.get(55, 5));
        assert!(mask.get(25, 24));
    }

    #[test]
    fn segmenting_twice_is_bit_identical() {
        let frame = striped_frame();
        let red = profile("red");
        assert_eq!(segment(&frame, &red), segment(&frame, &red));
    }
}
