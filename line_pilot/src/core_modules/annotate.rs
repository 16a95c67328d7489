// THEORY:
// The annotator produces the debug view an operator watches while flying: the
// camera frame, dimmed, with the tracked paint highlighted, a crosshair on the
// frame centre, a marker on the detected line and a banner whose color says
// which mode is active.
//
// It is pure drawing on top of `imageproc::drawing`. It reads a
// `FrameAnalysis`, never changes it, and returns a fresh image so the frame
// itself stays immutable.

use crate::core_modules::flight_mode::FlightMode;
use crate::core_modules::frame::Frame;
use crate::core_modules::line_candidate::{LineCandidate, Point};
use crate::pipeline::FrameAnalysis;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

const CROSSHAIR: Rgb<u8> = Rgb([255, 255, 255]);
const MASK_TINT: Rgb<u8> = Rgb([0, 255, 255]);
const MARKER: Rgb<u8> = Rgb([255, 0, 255]);
const CROSSHAIR_HALF: f64 = 12.0;
const MARKER_RADIUS: i32 = 6;
const BANNER_HEIGHT: u32 = 8;
/// Background pixels keep this share of their brightness.
const DIM_FACTOR: f32 = 0.5;

fn banner_color(mode: FlightMode) -> Rgb<u8> {
    match mode {
        FlightMode::Grounded => Rgb([128, 128, 128]),
        FlightMode::Takeoff | FlightMode::Landing => Rgb([255, 200, 0]),
        FlightMode::Manual => Rgb([0, 120, 255]),
        FlightMode::Autonomous => Rgb([0, 200, 0]),
        FlightMode::LineLost => Rgb([255, 120, 0]),
        FlightMode::Emergency => Rgb([255, 0, 0]),
    }
}

/// Straight line between two points, snapped to the nearest pixels and
/// clipped to the image.
fn draw_line(image: &mut RgbImage, from: Point, to: Point, color: Rgb<u8>) {
    let snap = |p: Point| (p.x.round() as f32, p.y.round() as f32);
    draw_line_segment_mut(image, snap(from), snap(to), color);
}

fn draw_circle(image: &mut RgbImage, center: Point, radius: i32, color: Rgb<u8>) {
    let center = (center.x.round() as i32, center.y.round() as i32);
    draw_hollow_circle_mut(image, center, radius, color);
}

fn draw_marker(image: &mut RgbImage, candidate: &LineCandidate) {
    match candidate {
        LineCandidate::Blob { centroid, .. } => {
            draw_circle(image, *centroid, MARKER_RADIUS, MARKER);
            draw_circle(image, *centroid, MARKER_RADIUS / 2, MARKER);
        }
        LineCandidate::Segment {
            point,
            angle_degrees,
            length,
        } => {
            let (sin, cos) = angle_degrees.to_radians().sin_cos();
            let half = length / 2.0;
            // Angle is measured from vertical with y pointing down the image.
            let top = Point::new(point.x + sin * half, point.y - cos * half);
            let bottom = Point::new(point.x - sin * half, point.y + cos * half);
            draw_line(image, bottom, top, MARKER);
            draw_circle(image, *point, MARKER_RADIUS / 2, MARKER);
        }
    }
}

/// Renders the debug overlay for one cycle.
pub fn annotate(frame: &Frame, analysis: Option<&FrameAnalysis>, mode: FlightMode) -> RgbImage {
    let mut output = frame.as_image().clone();

    // --- 1. Dim everything, highlight the mask ---
    if let Some(analysis) = analysis {
        for (x, y, pixel) in output.enumerate_pixels_mut() {
            if analysis.mask.get(x, y) {
                *pixel = MASK_TINT;
            } else {
                for channel in pixel.0.iter_mut() {
                    *channel = (*channel as f32 * DIM_FACTOR) as u8;
                }
            }
        }
    }

    // --- 2. Crosshair on the frame centre ---
    let cx = output.width() as f64 / 2.0;
    let cy = output.height() as f64 / 2.0;
    let half = CROSSHAIR_HALF;
    draw_line(&mut output, Point::new(cx - half, cy), Point::new(cx + half, cy), CROSSHAIR);
    draw_line(&mut output, Point::new(cx, cy - half), Point::new(cx, cy + half), CROSSHAIR);

    // --- 3. Detected line ---
    if let Some(candidate) = analysis.and_then(|a| a.candidate.as_ref()) {
        draw_marker(&mut output, candidate);
    }

    // --- 4. Mode banner ---
    let color = banner_color(mode);
    let banner = BANNER_HEIGHT.min(output.height());
    if banner > 0 && output.width() > 0 {
        let banner_rect = Rect::at(0, 0).of_size(output.width(), banner);
        draw_filled_rect_mut(&mut output, banner_rect, color);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::mask::Mask;
    use crate::core_modules::line_candidate::DetectionStrategy;
    use crate::core_modules::tracking::TrackingError;

    fn grey_frame() -> Frame {
        Frame::new(RgbImage::from_pixel(64, 48, Rgb([100, 100, 100])))
    }

    #[test]
    fn banner_and_crosshair_are_drawn_without_analysis() {
        let image = annotate(&grey_frame(), None, FlightMode::Autonomous);
        assert_eq!(*image.get_pixel(10, 0), banner_color(FlightMode::Autonomous));
        assert_eq!(*image.get_pixel(32, 24), CROSSHAIR);
        assert_eq!(*image.get_pixel(60, 40), Rgb([100, 100, 100]));
    }

    #[test]
    fn mask_is_highlighted_and_background_dimmed() {
        let mut mask = Mask::new(64, 48);
        mask.set(5, 40, true);
        let analysis = FrameAnalysis {
            mask,
            candidate: None,
            tracking: TrackingError::invalid(),
            strategy: DetectionStrategy::Contour,
        };
        let image = annotate(&grey_frame(), Some(&analysis), FlightMode::Manual);
        assert_eq!(*image.get_pixel(5, 40), MASK_TINT);
        assert_eq!(*image.get_pixel(60, 40), Rgb([50, 50, 50]));
    }

    #[test]
    fn segment_marker_follows_the_lean() {
        let analysis = FrameAnalysis {
            mask: Mask::new(64, 48),
            candidate: Some(LineCandidate::Segment {
                point: Point::new(32.0, 30.0),
                angle_degrees: 45.0,
                length: 20.0,
            }),
            tracking: TrackingError::invalid(),
            strategy: DetectionStrategy::Hough,
        };
        let image = annotate(&grey_frame(), Some(&analysis), FlightMode::Autonomous);
        // Top end leans right: (32 + 7.07, 30 - 7.07).
        assert_eq!(*image.get_pixel(39, 23), MARKER);
        assert_eq!(*image.get_pixel(25, 37), MARKER);
    }

    #[test]
    fn blob_marker_rings_the_centroid() {
        let analysis = FrameAnalysis {
            mask: Mask::new(64, 48),
            candidate: Some(LineCandidate::Blob {
                centroid: Point::new(20.2, 30.4),
                area: 300,
            }),
            tracking: TrackingError::invalid(),
            strategy: DetectionStrategy::Contour,
        };
        let image = annotate(&grey_frame(), Some(&analysis), FlightMode::Autonomous);
        assert_eq!(*image.get_pixel(26, 30), MARKER);
        assert_eq!(*image.get_pixel(20, 27), MARKER);
        assert_ne!(*image.get_pixel(20, 30), MARKER);
    }

    #[test]
    fn lines_are_clipped_to_the_image() {
        let mut image = RgbImage::new(10, 10);
        draw_line(&mut image, Point::new(-5.0, -5.0), Point::new(20.0, 20.0), MARKER);
        assert_eq!(*image.get_pixel(0, 0), MARKER);
        assert_eq!(*image.get_pixel(9, 9), MARKER);
    }
}
