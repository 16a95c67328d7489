// THEORY:
// A `Frame` is one still from the onboard camera. It is immutable once built
// and lives for a single processing pass: the cycle that receives it segments
// it, maybe annotates it, and drops it. The core never stores frames between
// cycles, so the only way to hold on to one is to share it behind an `Arc`
// with the frame source that produced it.

use crate::core_modules::hsv_pixel::hsv_pixel::Pixel;
use crate::error::{PilotError, Result};
use image::RgbImage;

const RGBA_CHANNELS: usize = 4;

/// An immutable RGB video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Builds a frame from a packed RGBA buffer, the layout most capture
    /// backends hand over. Alpha is discarded.
    pub fn from_rgba(width: u32, height: u32, buffer: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * RGBA_CHANNELS;
        if buffer.len() != expected {
            return Err(PilotError::FrameSize {
                width,
                height,
                expected,
                actual: buffer.len(),
            });
        }

        let mut image = RgbImage::new(width, height);
        for (pixel, bytes) in image.pixels_mut().zip(buffer.chunks_exact(RGBA_CHANNELS)) {
            pixel.0 = [bytes[0], bytes[1], bytes[2]];
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The pixel at `(x, y)`. Callers stay inside `width() x height()`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        Pixel::from(*self.image.get_pixel(x, y))
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Frame::new(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_buffer_drops_alpha() {
        let buffer = [10u8, 20, 30, 255, 40, 50, 60, 0];
        let frame = Frame::from_rgba(2, 1, &buffer).expect("valid buffer");
        assert_eq!(frame.pixel(0, 0), Pixel::new(10, 20, 30));
        assert_eq!(frame.pixel(1, 0), Pixel::new(40, 50, 60));
    }

    #[test]
    fn rgba_buffer_size_is_checked() {
        let err = Frame::from_rgba(2, 2, &[0u8; 12]).unwrap_err();
        assert!(matches!(err, PilotError::FrameSize { expected: 16, actual: 12, .. }));
    }
}
