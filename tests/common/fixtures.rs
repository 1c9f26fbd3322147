use image::{Rgb, RgbImage};
use std::io::Write;
use tempfile::NamedTempFile;

/// Writes `img` to a temporary PNG.
/// The file will be automatically cleaned up when dropped.
pub fn write_png(img: &RgbImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Creates a single-colour test image and returns the temp file.
pub fn create_test_image(width: u32, height: u32, rgb: [u8; 3]) -> NamedTempFile {
    write_png(&RgbImage::from_pixel(width, height, Rgb(rgb)))
}

/// A file with an image extension that holds no image data.
pub fn create_garbage_file() -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(b"definitely not a png")
        .expect("Failed to write temp file");
    file
}

/// 100x100 mid-gray scene.
pub fn gray_scene() -> RgbImage {
    RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]))
}

/// `gray_scene` with a darker 20x20 block whose top-left corner is (40, 40).
pub fn gray_scene_with_block() -> RgbImage {
    RgbImage::from_fn(100, 100, |x, y| {
        if in_block(x, y) { Rgb([64, 64, 64]) } else { Rgb([128, 128, 128]) }
    })
}

pub fn in_block(x: u32, y: u32) -> bool {
    (40..60).contains(&x) && (40..60).contains(&y)
}

/// Colour constants for tests
pub const CLOUD_WHITE: [u8; 3] = [245, 245, 245];
pub const FOREST_GREEN: [u8; 3] = [34, 139, 34];
