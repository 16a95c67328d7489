// THEORY:
// The `Mask` is the boundary between color and geometry. Everything upstream
// of it reasons about pixels' colors; everything downstream reasons only about
// which pixels are "line" and which are not.
//
// Key architectural principles:
// 1.  **Binary by construction**: Each cell is either `FOREGROUND` (255) or
//     `BACKGROUND` (0). Storing it as an 8-bit grey image keeps it trivially
//     savable for debugging and bit-comparable between runs.
// 2.  **Fixed-size morphology**: Camera noise shows up as isolated specks and
//     pin-holes inside the painted line. A 3x3 closing fills the holes, a 3x3
//     opening removes the specks. Both come from `imageproc::morphology` with
//     the chessboard norm at radius 1, which is exactly the 3x3 square.
//     Neighbors outside the frame are ignored, so a line touching the border
//     is not eaten away.
// 3.  **Fresh every cycle**: A mask is never updated in place across frames.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Chessboard radius of the structuring element.
const MORPHOLOGY_RADIUS: u8 = 1;

/// A binary image the same size as the frame it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// An all-background mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    /// Builds a mask by evaluating `predicate` for every coordinate.
    pub fn from_fn(width: u32, height: u32, predicate: impl Fn(u32, u32) -> bool) -> Self {
        let image = GrayImage::from_fn(width, height, |x, y| {
            Luma([if predicate(x, y) { FOREGROUND } else { BACKGROUND }])
        });
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[0] == FOREGROUND
    }

    /// Like `get`, but anything outside the mask reads as `None`.
    #[inline]
    pub fn get_signed(&self, x: i64, y: i64) -> Option<bool> {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return None;
        }
        Some(self.get(x as u32, y as u32))
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.image
            .put_pixel(x, y, Luma([if on { FOREGROUND } else { BACKGROUND }]));
    }

    /// Number of foreground cells.
    pub fn count(&self) -> usize {
        self.image.pixels().filter(|p| p.0[0] == FOREGROUND).count()
    }

    pub fn is_empty(&self) -> bool {
        self.image.pixels().all(|p| p.0[0] == BACKGROUND)
    }

    /// Iterates the coordinates of every foreground cell in raster order.
    pub fn foreground(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.image
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == FOREGROUND)
            .map(|(x, y, _)| (x, y))
    }

    /// Dilate then erode: fills pin-holes and hairline gaps.
    pub fn close(&self) -> Mask {
        Self {
            image: morphology::close(&self.image, Norm::LInf, MORPHOLOGY_RADIUS),
        }
    }

    /// Erode then dilate: removes isolated specks.
    pub fn open(&self) -> Mask {
        Self {
            image: morphology::open(&self.image, Norm::LInf, MORPHOLOGY_RADIUS),
        }
    }

    /// The outline of the foreground: set cells that touch a background cell
    /// through one of their four direct neighbors. The frame border is not an
    /// edge.
    pub fn edges(&self) -> Mask {
        Mask::from_fn(self.width(), self.height(), |x, y| {
            if !self.get(x, y) {
                return false;
            }
            [(0, -1), (0, 1), (-1, 0), (1, 0)]
                .iter()
                .any(|(dx, dy)| self.get_signed(x as i64 + dx, y as i64 + dy) == Some(false))
        })
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: u32, x0: u32, y0: u32, side: u32) -> Mask {
        Mask::from_fn(size, size, |x, y| {
            x >= x0 && x < x0 + side && y >= y0 && y < y0 + side
        })
    }

    #[test]
    fn opening_removes_isolated_specks() {
        let mut mask = square(20, 5, 5, 6);
        mask.set(0, 19, true);
        mask.set(15, 2, true);

        let opened = mask.open();
        assert!(!opened.get(0, 19));
        assert!(!opened.get(15, 2));
        assert_eq!(opened.count(), 36);
    }

    #[test]
    fn closing_fills_pin_holes() {
        let mut mask = square(20, 5, 5, 6);
        mask.set(7, 7, false);

        let closed = mask.close();
        assert!(closed.get(7, 7));
        assert_eq!(closed.count(), 36);
    }

    #[test]
    fn morphology_keeps_shapes_touching_the_border() {
        let mask = square(10, 0, 0, 4);
        assert_eq!(mask.open().count(), 16);
        assert_eq!(mask.close().count(), 16);
    }

    #[test]
    fn edges_trace_the_outline_only() {
        let mask = square(10, 2, 2, 4);
        let edges = mask.edges();
        assert_eq!(edges.count(), 12);
        assert!(!edges.get(3, 3));
        assert!(edges.get(2, 2));
    }

    #[test]
    fn empty_mask_stays_empty() {
        let mask = Mask::new(8, 8);
        assert!(mask.close().open().is_empty());
        assert!(mask.edges().is_empty());
    }
}
