// THEORY:
// The `LineCandidate` is the single best guess of where the line is in one
// frame. Two very different detectors produce it, and they disagree about what
// a "line" even is:
//
// 1.  The contour detector sees a *blob*: a patch of paint with a centre and an
//     area. It knows where the line is, but not which way it runs.
// 2.  The Hough detector sees a *segment*: a straight stroke with a midpoint and
//     an orientation. It knows both where the line is and which way it runs.
//
// Rather than forcing both into one lowest-common-denominator struct, the
// candidate is a tagged variant. Downstream code pattern-matches on it once
// (in the tracking estimator) and everything after that is strategy-agnostic.
//
// A detector that finds nothing above its threshold returns `None`. A
// zero-valued candidate would read as "line dead centre", which is exactly the
// wrong thing to tell a controller that is flying blind.

use crate::core_modules::mask::Mask;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 2D point in pixel coordinates (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One frame's best estimate of the tracked line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineCandidate {
    /// The largest connected patch of line color.
    Blob {
        /// Mean pixel coordinate of the blob.
        centroid: Point,
        /// Pixel count.
        area: usize,
    },
    /// The best straight segment in the mask's outline.
    Segment {
        /// Midpoint of the segment.
        point: Point,
        /// Lean from vertical in degrees; 0 runs straight ahead, positive leans right.
        angle_degrees: f64,
        /// Segment length in pixels.
        length: f64,
    },
}

impl LineCandidate {
    /// The point used for lateral steering.
    pub fn anchor(&self) -> Point {
        match self {
            LineCandidate::Blob { centroid, .. } => *centroid,
            LineCandidate::Segment { point, .. } => *point,
        }
    }
}

/// Which extractor is active. Exactly one runs per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    #[default]
    Contour,
    Hough,
}

impl fmt::Display for DetectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionStrategy::Contour => write!(f, "contour"),
            DetectionStrategy::Hough => write!(f, "hough"),
        }
    }
}

impl FromStr for DetectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contour" => Ok(DetectionStrategy::Contour),
            "hough" => Ok(DetectionStrategy::Hough),
            other => Err(format!("unknown detection strategy '{other}' (expected contour or hough)")),
        }
    }
}

/// The interface both detection strategies implement.
pub trait LineExtractor {
    /// Finds the line in `mask`, or `None` if nothing clears the threshold.
    fn extract(&self, mask: &Mask) -> Option<LineCandidate>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_is_the_centroid_or_the_midpoint() {
        let blob = LineCandidate::Blob {
            centroid: Point::new(3.0, 4.0),
            area: 10,
        };
        let segment = LineCandidate::Segment {
            point: Point::new(7.0, 8.0),
            angle_degrees: 12.0,
            length: 40.0,
        };
        assert_eq!(blob.anchor(), Point::new(3.0, 4.0));
        assert_eq!(segment.anchor(), Point::new(7.0, 8.0));
    }

    #[test]
    fn strategy_names_parse_and_print() {
        assert_eq!("Hough".parse::<DetectionStrategy>(), Ok(DetectionStrategy::Hough));
        assert_eq!(" contour ".parse::<DetectionStrategy>(), Ok(DetectionStrategy::Contour));
        assert!("canny".parse::<DetectionStrategy>().is_err());
        assert_eq!(DetectionStrategy::Hough.to_string(), "hough");
    }
}
