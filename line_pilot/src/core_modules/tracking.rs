// THEORY:
// The `TrackingEstimator` is where the two detection strategies stop being
// different. Whatever the extractor saw, the controller only ever receives a
// `TrackingError`: how far the line is from the middle of the frame, and (when
// known) how far it leans from straight ahead.
//
// Key architectural principles:
// 1.  **Normalization**: Offsets are divided by the half-frame, so gains mean
//     the same thing at any camera resolution. The lateral offset is -1 at the
//     left border, 0 dead centre, +1 at the right border.
// 2.  **Validity over Guessing**: No candidate (or one with non-finite
//     geometry) produces an explicitly invalid error with zero offsets. The
//     controller is never asked to steer toward a line that is not there.
// 3.  **Memoryless**: Each error is computed from the current candidate alone.

use crate::core_modules::line_candidate::LineCandidate;

/// Wraps an angle in degrees into `(-90, 90]`. Lines have no direction, so a
/// lean of 120 degrees is the same line as one of -60.
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(180.0);
    if wrapped > 90.0 { wrapped - 180.0 } else { wrapped }
}

/// One cycle's normalized deviation of the line from the frame centre.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackingError {
    /// `(x - w/2) / (w/2)`, in `[-1, 1]`. Positive means the line is right of centre.
    pub lateral_offset: f64,
    /// Lean from vertical in degrees, in `[-90, 90]`. Only the geometric strategy sets it.
    pub angular_offset: Option<f64>,
    /// `(y - h/2) / (h/2)`, in `[-1, 1]`. Positive means the anchor is below centre.
    pub vertical_offset: f64,
    pub valid: bool,
}

impl TrackingError {
    /// The "no line this cycle" error.
    pub const fn invalid() -> Self {
        Self {
            lateral_offset: 0.0,
            angular_offset: None,
            vertical_offset: 0.0,
            valid: false,
        }
    }
}

fn normalize(coordinate: f64, extent: u32) -> f64 {
    let half = extent as f64 / 2.0;
    ((coordinate - half) / half).clamp(-1.0, 1.0)
}

/// Converts an extractor's output into a normalized tracking error.
pub fn estimate(candidate: Option<&LineCandidate>, frame_width: u32, frame_height: u32) -> TrackingError {
    let Some(candidate) = candidate else {
        return TrackingError::invalid();
    };
    if frame_width == 0 || frame_height == 0 {
        return TrackingError::invalid();
    }

    let anchor = candidate.anchor();
    if !anchor.x.is_finite() || !anchor.y.is_finite() {
        return TrackingError::invalid();
    }

    let angular_offset = match candidate {
        LineCandidate::Blob { .. } => None,
        LineCandidate::Segment { angle_degrees, .. } => {
            if !angle_degrees.is_finite() {
                return TrackingError::invalid();
            }
            Some(wrap_degrees(*angle_degrees))
        }
    };

    TrackingError {
        lateral_offset: normalize(anchor.x, frame_width),
        angular_offset,
        vertical_offset: normalize(anchor.y, frame_height),
        valid: true,
    }
}
