// THEORY:
// The `pipeline` module is the perception half of the autopilot in a single
// call. It takes one frame and the operator's current choices (which color,
// which detector) and returns everything the rest of the cycle needs: the
// mask, the raw candidate and the normalized tracking error.
//
// It holds no per-frame state. Both extractors are built once from the config
// and the one matching the active strategy runs; the other sits idle. There is
// no fusion of the two.

use crate::config::PilotConfig;
use crate::core_modules::color_profile::ColorProfile;
use crate::core_modules::color_segmenter;
use crate::core_modules::contour_extractor::ContourExtractor;
use crate::core_modules::frame::Frame;
use crate::core_modules::hough_extractor::HoughExtractor;
use crate::core_modules::line_candidate::{DetectionStrategy, LineCandidate, LineExtractor};
use crate::core_modules::mask::Mask;
use crate::core_modules::tracking::{self, TrackingError};

/// The perception result for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    pub mask: Mask,
    pub candidate: Option<LineCandidate>,
    pub tracking: TrackingError,
    pub strategy: DetectionStrategy,
}

impl FrameAnalysis {
    pub fn line_detected(&self) -> bool {
        self.tracking.valid
    }
}

/// The main, top-level struct for the perception stages.
#[derive(Debug, Clone)]
pub struct VisionPipeline {
    contour: ContourExtractor,
    hough: HoughExtractor,
}

impl VisionPipeline {
    pub fn new(config: &PilotConfig) -> Self {
        Self {
            contour: ContourExtractor::new(config.min_line_area),
            hough: HoughExtractor::new(
                config.hough_threshold,
                config.hough_min_line_length,
                config.hough_max_line_gap,
            ),
        }
    }

    fn extractor(&self, strategy: DetectionStrategy) -> &dyn LineExtractor {
        match strategy {
            DetectionStrategy::Contour => &self.contour,
            DetectionStrategy::Hough => &self.hough,
        }
    }

    pub fn analyze(
        &self,
        frame: &Frame,
        profile: &ColorProfile,
        strategy: DetectionStrategy,
    ) -> FrameAnalysis {
        // Stage 1: Color Segmentation
        let mask = color_segmenter::segment(frame, profile);

        // Stage 2: Line Extraction (active strategy only)
        let candidate = if mask.is_empty() {
            None
        } else {
            self.extractor(strategy).extract(&mask)
        };

        // Stage 3: Normalization
        let tracking = tracking::estimate(candidate.as_ref(), frame.width(), frame.height());

        log::trace!(
            "pipeline: {} '{}' mask={}px candidate={:?}",
            strategy,
            profile.name,
            mask.count(),
            candidate
        );

        FrameAnalysis {
            mask,
            candidate,
            tracking,
            strategy,
        }
    }
}
