use image::{imageops::FilterType, ImageFormat, RgbImage};
use ndarray::Array4;

use crate::error::DecodeError;

/// Side length of the square input the captioning model was trained on.
pub const INPUT_SIZE: u32 = 299;

/// `[batch, height, width, channel]`
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3];

/// Decode JPEG bytes into a `[1, 299, 299, 3]` tensor scaled to `[-1, 1]`.
///
/// The image is stretched to the target size without letterboxing, the same
/// way the model's training pipeline resized its inputs.
pub fn preprocess_jpeg(bytes: &[u8]) -> Result<Array4<f32>, DecodeError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?.to_rgb8();
    let image = image::imageops::resize(&image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    Ok(normalize(&image))
}

// inception-style scaling: 0 -> -1.0, 255 -> 1.0
fn normalize(image: &RgbImage) -> Array4<f32> {
    let mut array = Array4::zeros(INPUT_SHAPE);

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            array[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 127.5 - 1.0;
        }
    }

    array
}
