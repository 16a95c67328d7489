// THEORY (HSV Pixel):
// The `Pixel` module is the most fundamental unit of the segmenter. It is a
// "dumb" data container for a single RGB pixel plus exactly one heuristic: its
// position in hue/saturation/value space. Anything that needs a neighbor (noise
// cleanup, connectivity, edges) lives in higher modules like `Mask`.
//
// Why HSV?
// - Hue separates "which color" from "how bright", so a painted line stays the
//   same hue under shade, glare and auto-exposure swings.
// - Saturation rejects grey concrete and white glare for the chromatic colors,
//   while a low-saturation/high-value window is exactly what "white" means.
//
// Scale:
// The 8-bit convention is used throughout so that color profiles read like the
// thresholds field crews already tune: H in [0, 180] (degrees / 2), S and V in
// [0, 255]. Red wraps around H = 0, which is why a profile may carry two ranges.
//
// Key principles:
// 1) Single-pixel scope: no history, no neighbors.
// 2) Integer in, integer out: the classification must be bit-for-bit
//    repeatable, so rounding happens once, at the end.

pub mod hsv_pixel {
    pub type Channel = u8;
    pub type Hue = u8;
    pub type Saturation = u8;
    pub type Value = u8;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    /// A pixel expressed on the 8-bit HSV scale.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Hsv {
        /// Hue in half-degrees, 0..=180.
        pub hue: Hue,
        /// Saturation, 0..=255.
        pub saturation: Saturation,
        /// Value (brightest channel), 0..=255.
        pub value: Value,
    }

    impl Hsv {
        pub fn channels(&self) -> [u8; 3] {
            [self.hue, self.saturation, self.value]
        }
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        /// Converts to the 8-bit HSV scale.
        ///
        /// - Value is the brightest channel.
        /// - Saturation is chroma relative to value, scaled to 255.
        /// - Hue is the color-wheel angle halved so it fits a byte, in 0..180;
        ///   achromatic pixels report hue 0.
        pub fn to_hsv(&self) -> Hsv {
            let red = self.red as f32;
            let green = self.green as f32;
            let blue = self.blue as f32;

            let maximum_channel = red.max(green.max(blue));
            let minimum_channel = red.min(green.min(blue));
            let chroma = maximum_channel - minimum_channel;

            let saturation = if maximum_channel <= 0.0 {
                0.0
            } else {
                255.0 * chroma / maximum_channel
            };

            if chroma <= 0.0 {
                return Hsv {
                    hue: 0,
                    saturation: saturation.round() as Saturation,
                    value: self.max_channel(),
                };
            }

            let mut hue_degrees = if maximum_channel == red {
                60.0 * (green - blue) / chroma
            } else if maximum_channel == green {
                120.0 + 60.0 * (blue - red) / chroma
            } else {
                240.0 + 60.0 * (red - green) / chroma
            };
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }

            Hsv {
                // A full turn rounds back onto red.
                hue: ((hue_degrees / 2.0).round() as u32 % 180) as Hue,
                saturation: saturation.round() as Saturation,
                value: self.max_channel(),
            }
        }

        #[inline]
        fn max_channel(&self) -> Value {
            self.red.max(self.green.max(self.blue))
        }
    }

    impl From<&[u8]> for Pixel {
        /// Reads the first three bytes as R, G, B. Shorter slices read as black.
        fn from(bytes: &[u8]) -> Self {
            match bytes {
                [red, green, blue, ..] => Pixel::new(*red, *green, *blue),
                _ => Pixel::default(),
            }
        }
    }

    impl From<image::Rgb<u8>> for Pixel {
        fn from(rgb: image::Rgb<u8>) -> Self {
            let [red, green, blue] = rgb.0;
            Pixel::new(red, green, blue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::hsv_pixel::*;

    #[test]
    fn primaries_land_on_their_hues() {
        assert_eq!(Pixel::new(255, 0, 0).to_hsv().hue, 0);
        assert_eq!(Pixel::new(0, 255, 0).to_hsv().hue, 60);
        assert_eq!(Pixel::new(0, 0, 255).to_hsv().hue, 120);
        assert_eq!(Pixel::new(255, 255, 0).to_hsv().hue, 30);
    }

    #[test]
    fn greys_are_unsaturated() {
        let hsv = Pixel::new(200, 200, 200).to_hsv();
        assert_eq!(hsv, Hsv { hue: 0, saturation: 0, value: 200 });

        let black = Pixel::new(0, 0, 0).to_hsv();
        assert_eq!(black, Hsv::default());
    }

    #[test]
    fn magenta_side_of_red_wraps_high() {
        // Slightly blue-shifted red sits at the top of the hue scale.
        let hsv = Pixel::new(255, 0, 30).to_hsv();
        assert!(hsv.hue >= 170, "hue was {}", hsv.hue);
        assert_eq!(hsv.saturation, 255);
    }

    #[test]
    fn hue_just_short_of_a_full_turn_wraps_to_red() {
        // 359.8 degrees halves to 179.9 and rounds onto 0, not 180.
        let hsv = Pixel::new(255, 0, 1).to_hsv();
        assert_eq!(hsv.hue, 0);
        for blue in 0..=255u8 {
            assert!(Pixel::new(255, 0, blue).to_hsv().hue < 180);
        }
    }

    #[test]
    fn short_slices_read_as_black() {
        assert_eq!(Pixel::from(&[1u8, 2][..]), Pixel::default());
        assert_eq!(Pixel::from(&[1u8, 2, 3, 4][..]), Pixel::new(1, 2, 3));
    }
}
