pub mod image_helper {
    use crate::core_modules::mask::Mask;
    use image::{ExtendedColorType, ImageEncoder, RgbImage};
    use std::path::Path;

    /// Writes a raw pixel buffer as PNG.
    pub fn save(
        path: &Path,
        width: u32,
        height: u32,
        buffer: &[u8],
        color: ExtendedColorType,
    ) -> Result<(), image::error::ImageError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(buffer, width, height, color)?;

        Ok(())
    }

    /// Saves an annotated frame.
    pub fn save_rgb(path: &Path, image: &RgbImage) -> Result<(), image::error::ImageError> {
        save(path, image.width(), image.height(), image.as_raw(), ExtendedColorType::Rgb8)
    }

    /// Saves a mask as a black and white PNG.
    pub fn save_mask(path: &Path, mask: &Mask) -> Result<(), image::error::ImageError> {
        let image = mask.as_image();
        save(path, image.width(), image.height(), image.as_raw(), ExtendedColorType::L8)
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::mask::Mask;
    use image::{Rgb, RgbImage};

    #[test]
    fn save_annotated_frame() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frame.png");
        let image = RgbImage::from_pixel(32, 24, Rgb([10, 200, 30]));

        save_rgb(&path, &image).expect("Error Saving File.");

        let loaded = image::open(&path).expect("reload").to_rgb8();
        assert_eq!(loaded, image);
    }

    #[test]
    fn save_mask_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mask.png");
        let mask = Mask::from_fn(40, 30, |x, _| x % 2 == 0);

        save_mask(&path, &mask).expect("Error Saving File.");

        let loaded = image::open(&path).expect("reload").to_luma8();
        assert_eq!(&loaded, mask.as_image());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nope").join("frame.png");
        assert!(save_rgb(&path, &RgbImage::new(2, 2)).is_err());
    }
}
