// THEORY:
// The `HoughExtractor` is the geometric line detector. Where the contour
// strategy only knows *where* the paint is, this one also knows *which way it
// runs*, so the controller can yaw into a bend before drifting off it.
//
// Algorithm steps:
// 1.  **Edge Map**: Only the outline of the mask votes. A filled stripe would
//     otherwise vote for every line that crosses it.
// 2.  **Voting**: `imageproc::hough` lets each edge pixel vote for every
//     (rho, theta) line through it, at 1 pixel by 1 degree resolution, with
//     theta in [0, 180).
// 3.  **Peaks**: Cells at or above `threshold` that survive 3x3 non-maximum
//     suppression are line hypotheses. Only the `HOUGH_MAX_PEAKS` with the
//     most supporting edge pixels are examined.
// 4.  **Segmentation**: Edge pixels within one pixel of a hypothesis are
//     projected onto it and split wherever the gap exceeds `max_line_gap`.
//     Runs at least `min_line_length` long are refit with a principal-axis fit
//     so the reported angle is not quantised to the accumulator's 1 degree bins.
// 5.  **Scoring**: `length / (1 + |mid_x - cx| / cx)`. Long segments near the
//     middle of the frame win. Ties keep the first segment found.

use crate::core_modules::line_candidate::{LineCandidate, LineExtractor, Point};
use crate::core_modules::mask::Mask;
use crate::core_modules::tracking::wrap_degrees;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};

/// Upper bound on accumulator peaks turned into segments per frame.
pub const HOUGH_MAX_PEAKS: usize = 16;

/// Edge pixels farther than this from a peak line do not support it.
const SUPPORT_DISTANCE: f64 = 1.0;

/// A straight run of edge pixels after refitting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
    pub length: f64,
    /// Lean from vertical, positive when the top of the segment is to the right.
    pub angle_degrees: f64,
}

impl Segment {
    pub fn midpoint(&self) -> Point {
        Point::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }

    /// Longer is better, off-centre is penalised.
    pub fn score(&self, frame_width: u32) -> f64 {
        let center_x = frame_width as f64 / 2.0;
        if center_x <= 0.0 {
            return self.length;
        }
        self.length / (1.0 + (self.midpoint().x - center_x).abs() / center_x)
    }
}

/// Geometric-line strategy: best Hough segment's midpoint and lean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughExtractor {
    /// Minimum accumulator votes for a line hypothesis.
    pub threshold: u32,
    pub min_line_length: f64,
    pub max_line_gap: f64,
}

impl HoughExtractor {
    pub fn new(threshold: u32, min_line_length: f64, max_line_gap: f64) -> Self {
        Self {
            threshold,
            min_line_length,
            max_line_gap,
        }
    }

    /// Every segment found in `mask`, strongest hypothesis first.
    pub fn segments(&self, mask: &Mask) -> Vec<Segment> {
        let edge_map = mask.edges();
        let edges: Vec<(u32, u32)> = edge_map.foreground().collect();
        if edges.is_empty() {
            return Vec::new();
        }

        let options = LineDetectionOptions {
            vote_threshold: self.threshold,
            suppression_radius: 1,
        };
        let mut hypotheses: Vec<(usize, f64, f64)> = detect_lines(edge_map.as_image(), options)
            .iter()
            .map(|line| {
                let (theta, rho) = bin_center(line);
                (support_count(&edges, theta, rho), theta, rho)
            })
            .collect();
        hypotheses.sort_by(|a, b| b.0.cmp(&a.0));
        hypotheses.truncate(HOUGH_MAX_PEAKS);

        hypotheses
            .into_iter()
            .flat_map(|(_, theta, rho)| self.runs_along(&edges, theta, rho))
            .collect()
    }

    /// Splits the edge pixels supporting one line into gap-free runs.
    fn runs_along(&self, edges: &[(u32, u32)], theta: f64, rho: f64) -> Vec<Segment> {
        let (sin, cos) = theta.sin_cos();

        // Position along the line for each supporting pixel.
        let mut support: Vec<(f64, u32, u32)> = edges
            .iter()
            .filter(|&&(x, y)| supports(x, y, sin, cos, rho))
            .map(|&(x, y)| (-(x as f64) * sin + y as f64 * cos, x, y))
            .collect();
        support.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut segments = Vec::new();
        let mut run_start = 0;
        for i in 1..=support.len() {
            let split = i == support.len() || support[i].0 - support[i - 1].0 > self.max_line_gap;
            if !split {
                continue;
            }
            let run = &support[run_start..i];
            run_start = i;

            let extent = run[run.len() - 1].0 - run[0].0;
            if extent < self.min_line_length {
                continue;
            }
            let points: Vec<(f64, f64)> = run.iter().map(|&(_, x, y)| (x as f64, y as f64)).collect();
            segments.push(fit_segment(&points));
        }
        segments
    }
}

impl LineExtractor for HoughExtractor {
    fn extract(&self, mask: &Mask) -> Option<LineCandidate> {
        let mut best: Option<(f64, Segment)> = None;
        for segment in self.segments(mask) {
            let score = segment.score(mask.width());
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, segment));
            }
        }

        let (score, segment) = best?;
        log::trace!(
            "hough: best segment len={:.1} angle={:.1} score={:.1}",
            segment.length,
            segment.angle_degrees,
            score
        );
        Some(LineCandidate::Segment {
            point: segment.midpoint(),
            angle_degrees: segment.angle_degrees,
            length: segment.length,
        })
    }
}

/// Principal-axis fit of a run of pixels, with endpoints projected onto the axis.
fn fit_segment(points: &[(f64, f64)]) -> Segment {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    let phi = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let (mut dir_y, mut dir_x) = phi.sin_cos();
    // Point the direction up the image so the sign of the lean is stable.
    if dir_y > 0.0 {
        dir_x = -dir_x;
        dir_y = -dir_y;
    }

    let (mut t_min, mut t_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in points {
        let t = (x - mean_x) * dir_x + (y - mean_y) * dir_y;
        t_min = t_min.min(t);
        t_max = t_max.max(t);
    }

    let at = |t: f64| Point::new(mean_x + t * dir_x, mean_y + t * dir_y);
    Segment {
        start: at(t_min),
        end: at(t_max),
        length: t_max - t_min,
        angle_degrees: wrap_degrees(dir_x.atan2(-dir_y).to_degrees()),
    }
}

/// The line a detected cell stands for, as (theta radians, rho pixels).
/// `imageproc` truncates rho toward zero, so the cell's centre sits half a
/// pixel further out.
fn bin_center(line: &PolarLine) -> (f64, f64) {
    let r = line.r as f64;
    let rho = if r > 0.0 {
        r + 0.5
    } else if r < 0.0 {
        r - 0.5
    } else {
        0.0
    };
    ((line.angle_in_degrees as f64).to_radians(), rho)
}

#[inline]
fn supports(x: u32, y: u32, sin: f64, cos: f64, rho: f64) -> bool {
    (x as f64 * cos + y as f64 * sin - rho).abs() <= SUPPORT_DISTANCE
}

fn support_count(edges: &[(u32, u32)], theta: f64, rho: f64) -> usize {
    let (sin, cos) = theta.sin_cos();
    edges
        .iter()
        .filter(|&&(x, y)| supports(x, y, sin, cos, rho))
        .count()
}
