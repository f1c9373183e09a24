//! Image decoding and CLIP pixel preprocessing.
//!
//! Mirrors the CLIP image processor: centered square crop, bicubic resize
//! to 224x224, rescale to `[0, 1]`, then per-channel mean/std normalization
//! into an NCHW tensor. Cropping before resizing gives the same framing as
//! resize-then-crop while keeping the intermediate image at most the
//! source size.

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use ndarray::Array4;

use crate::error::EmbeddingError;
use crate::Result;

/// Side length of the square CLIP vision input.
pub const CLIP_IMAGE_SIZE: u32 = 224;

/// CLIP RGB normalization mean values.
#[allow(clippy::excessive_precision)]
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP RGB normalization standard deviation values.
#[allow(clippy::excessive_precision)]
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Detect image format from magic bytes.
///
/// # Errors
///
/// Returns [`EmbeddingError::Decode`] if the format is not recognized.
pub fn detect_format(bytes: &[u8]) -> std::result::Result<ImageFormat, EmbeddingError> {
    match bytes {
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),
        _ => Err(EmbeddingError::Decode("unsupported image format".to_string())),
    }
}

/// Decode raw upload bytes into an image.
///
/// # Errors
///
/// Returns [`EmbeddingError::Decode`] for empty, unrecognized or corrupt payloads.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(EmbeddingError::Decode("image payload is empty".to_string()).into());
    }

    let format = detect_format(bytes)?;

    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| EmbeddingError::Decode(format!("failed to decode image: {e}")))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(EmbeddingError::Decode("image has zero width or height".to_string()).into());
    }

    tracing::trace!(
        format = ?format,
        width = image.width(),
        height = image.height(),
        "Decoded image"
    );

    Ok(image)
}

/// Crop the centered `size` x `size` square.
#[must_use]
pub fn center_crop(image: &DynamicImage, size: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let x = w.saturating_sub(size) / 2;
    let y = h.saturating_sub(size) / 2;
    image.crop_imm(x, y, size.min(w), size.min(h))
}

/// Crop the centered square of side `min(width, height)` and resize it to
/// `size` x `size`.
#[must_use]
pub fn resize_square(image: &DynamicImage, size: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let square = center_crop(image, w.min(h));
    square.resize_exact(size, size, FilterType::CatmullRom)
}

/// Convert an image into a normalized `[1, 3, H, W]` tensor.
#[must_use]
pub fn pixel_values(image: &DynamicImage) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut tensor = Array4::zeros((1, 3, h as usize, w as usize));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - CLIP_MEAN[c]) / CLIP_STD[c];
        }
    }

    tensor
}

/// Full CLIP preprocessing of an already decoded image.
#[must_use]
pub fn preprocess_image(image: &DynamicImage) -> Array4<f32> {
    pixel_values(&resize_square(image, CLIP_IMAGE_SIZE))
}

/// Decode and preprocess an upload in one step.
///
/// # Errors
///
/// Returns [`EmbeddingError::Decode`] if the payload is not a valid image.
pub fn preprocess(bytes: &[u8]) -> Result<Array4<f32>> {
    let image = decode_image(bytes)?;
    Ok(preprocess_image(&image))
}
