// THEORY:
// A `ColorProfile` names one line color the pilot can follow and describes it
// as a set of closed HSV boxes. Most colors need one box. Red needs two,
// because its hue straddles the 0/180 seam of the hue wheel.
//
// Profiles are static configuration: they are loaded once, validated once,
// and afterwards only *selected*, never edited, while the vehicle flies.

use crate::core_modules::hsv_pixel::hsv_pixel::Hsv;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// The largest hue on the 8-bit scale.
pub const MAX_HUE: u8 = 180;

/// A closed interval per HSV channel: `lower[i] <= channel[i] <= upper[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn contains(&self, hsv: Hsv) -> bool {
        let channels = hsv.channels();
        (0..3).all(|i| self.lower[i] <= channels[i] && channels[i] <= self.upper[i])
    }
}

/// A named line color made of one or more HSV ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorProfile {
    pub name: String,
    pub ranges: Vec<HsvRange>,
}

impl ColorProfile {
    pub fn new(name: impl Into<String>, ranges: Vec<HsvRange>) -> Self {
        Self {
            name: name.into(),
            ranges,
        }
    }

    /// A pixel matches if it falls inside ANY of the profile's ranges.
    #[inline]
    pub fn matches(&self, hsv: Hsv) -> bool {
        self.ranges.iter().any(|range| range.contains(hsv))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ranges.is_empty() {
            return Err(ConfigError::EmptyColorRange(self.name.clone()));
        }
        for (index, range) in self.ranges.iter().enumerate() {
            for channel in 0..3 {
                if range.lower[channel] > range.upper[channel] {
                    return Err(ConfigError::InvertedColorRange {
                        profile: self.name.clone(),
                        index,
                        channel,
                    });
                }
            }
            if range.upper[0] > MAX_HUE {
                return Err(ConfigError::HueOutOfRange {
                    profile: self.name.clone(),
                    index,
                    hue: range.upper[0],
                });
            }
        }
        Ok(())
    }
}

/// The five paint colors the field kit ships with, in key-binding order.
pub fn builtin_profiles() -> Vec<ColorProfile> {
    vec![
        ColorProfile::new("white", vec![HsvRange::new([0, 0, 200], [180, 30, 255])]),
        ColorProfile::new(
            "red",
            vec![
                HsvRange::new([0, 120, 70], [10, 255, 255]),
                HsvRange::new([170, 120, 70], [180, 255, 255]),
            ],
        ),
        ColorProfile::new("green", vec![HsvRange::new([40, 120, 70], [80, 255, 255])]),
        ColorProfile::new("yellow", vec![HsvRange::new([20, 120, 70], [40, 255, 255])]),
        ColorProfile::new("blue", vec![HsvRange::new([100, 120, 70], [130, 255, 255])]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::hsv_pixel::hsv_pixel::Pixel;

    fn profile(name: &str) -> ColorProfile {
        builtin_profiles()
            .into_iter()
            .find(|p| p.name == name)
            .expect("builtin profile")
    }

    #[test]
    fn red_matches_both_sides_of_the_hue_seam() {
        let red = profile("red");
        assert!(red.matches(Pixel::new(220, 20, 10).to_hsv()));
        assert!(red.matches(Pixel::new(220, 10, 40).to_hsv()));
        assert!(!red.matches(Pixel::new(20, 220, 10).to_hsv()));
    }

    #[test]
    fn white_rejects_saturated_and_dark_pixels() {
        let white = profile("white");
        assert!(white.matches(Pixel::new(240, 240, 235).to_hsv()));
        assert!(!white.matches(Pixel::new(90, 90, 90).to_hsv()));
        assert!(!white.matches(Pixel::new(255, 200, 0).to_hsv()));
    }

    #[test]
    fn builtins_are_valid() {
        for p in builtin_profiles() {
            p.validate().expect("builtin profile must validate");
        }
    }

    #[test]
    fn inverted_and_empty_ranges_are_rejected() {
        let empty = ColorProfile::new("void", vec![]);
        assert_eq!(empty.validate(), Err(ConfigError::EmptyColorRange("void".into())));

        let inverted = ColorProfile::new("bad", vec![HsvRange::new([50, 0, 0], [40, 255, 255])]);
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvertedColorRange { channel: 0, .. })
        ));

        let hue = ColorProfile::new("hue", vec![HsvRange::new([0, 0, 0], [200, 255, 255])]);
        assert!(matches!(hue.validate(), Err(ConfigError::HueOutOfRange { hue: 200, .. })));
    }
}
