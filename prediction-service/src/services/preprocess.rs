//! Image decoding and tensor preparation for the classifier.
//!
//! Every image is coerced to 8-bit RGB (grayscale replicated, alpha dropped),
//! resized to 224x224 with nearest-neighbor sampling and scaled to `[0, 1]`.
//! The output layout is NHWC with a batch of one.

use image::RgbImage;
use thiserror::Error;
use tract_onnx::prelude::tract_ndarray::Array4;

/// Spatial size expected by the classifier.
pub const INPUT_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Unsupported or corrupt image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Image has no pixels")]
    EmptyImage,

    #[error("Preprocessing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Batched `[1, 224, 224, 3]` tensor with values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct InferenceInput(Array4<f32>);

impl InferenceInput {
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }

    pub fn into_array(self) -> Array4<f32> {
        self.0
    }
}

/// Decode and preprocess on the blocking pool.
pub async fn preprocess_image(bytes: Vec<u8>) -> Result<InferenceInput, PreprocessError> {
    tokio::task::spawn_blocking(move || preprocess(&bytes)).await?
}

pub fn preprocess(bytes: &[u8]) -> Result<InferenceInput, PreprocessError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(PreprocessError::EmptyImage);
    }

    Ok(InferenceInput(to_tensor(&rgb, INPUT_SIZE, INPUT_SIZE)))
}

fn to_tensor(image: &RgbImage, out_width: u32, out_height: u32) -> Array4<f32> {
    let (in_width, in_height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((
        1,
        out_height as usize,
        out_width as usize,
        CHANNELS,
    ));

    for y in 0..out_height {
        let src_y = nearest_index(y, in_height, out_height);
        for x in 0..out_width {
            let src_x = nearest_index(x, in_width, out_width);
            let pixel = image.get_pixel(src_x, src_y);
            for c in 0..CHANNELS {
                tensor[[0, y as usize, x as usize, c]] = f32::from(pixel[c]) / 255.0;
            }
        }
    }

    tensor
}

/// Source index for a destination index, without half-pixel centers or
/// corner alignment: `min(floor(dst * in / out), in - 1)`.
fn nearest_index(dst: u32, src_len: u32, dst_len: u32) -> u32 {
    let scale = src_len as f32 / dst_len as f32;
    ((dst as f32 * scale).floor() as u32).min(src_len - 1)
}
