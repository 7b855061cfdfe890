//! Image preprocessing for OCR
//!
//! Decodes uploaded bytes and binarizes them with a local (adaptive)
//! Gaussian threshold. The step order is fixed.

use image::metadata::Orientation;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageReader, Luma, RgbImage};
use std::io::Cursor;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use tracing::debug;

use super::OcrError;

/// Side length of the square neighbourhood used for the local threshold
pub const ADAPTIVE_BLOCK_SIZE: usize = 11;

/// Subtracted from the local mean before comparing
pub const ADAPTIVE_OFFSET: i32 = 2;

/// Radius 0 is a 1x1 structuring element, so dilation leaves a binary image
/// unchanged. Kept as an explicit step of the pipeline.
pub const DILATION_RADIUS: u8 = 0;

/// Decode, grayscale, threshold and dilate raw image bytes
pub fn preprocess(bytes: &[u8]) -> Result<GrayImage, OcrError> {
    let rgb = decode_rgb(bytes)?;
    let gray = to_grayscale(&rgb);
    let binary = adaptive_threshold(&gray);
    let result = dilate_binary(&binary);

    debug!("Preprocessed {}x{} image", result.width(), result.height());
    Ok(result)
}

/// Decode and grayscale only, for re-reading crops of the source image
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage, OcrError> {
    decode_rgb(bytes).map(|rgb| to_grayscale(&rgb))
}

/// Decode arbitrary encoded bytes into a 3-channel image, upright according
/// to any EXIF orientation tag
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, OcrError> {
    if bytes.is_empty() {
        return Err(OcrError::InvalidImage("empty upload".to_string()));
    }

    let invalid = |e: image::ImageError| OcrError::InvalidImage(format!("cannot decode image: {}", e));
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| OcrError::InvalidImage(format!("cannot read image: {}", e)))?
        .into_decoder()
        .map_err(invalid)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder).map_err(invalid)?;
    if orientation != Orientation::NoTransforms {
        debug!("Applying EXIF orientation {:?}", orientation);
        image.apply_orientation(orientation);
    }

    if image.width() == 0 || image.height() == 0 {
        return Err(OcrError::InvalidImage("image has no pixels".to_string()));
    }

    Ok(image.to_rgb8())
}

/// Convert to single-channel grayscale with the standard luminance weights
pub fn to_grayscale(rgb: &RgbImage) -> GrayImage {
    let (width, height) = rgb.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Luma([luminance(r, g, b)])
    })
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let gray = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    gray.round().clamp(0.0, 255.0) as u8
}

/// Binarize against a Gaussian-weighted local mean.
///
/// A pixel becomes 255 when it is brighter than the weighted mean of its
/// [`ADAPTIVE_BLOCK_SIZE`] neighbourhood minus [`ADAPTIVE_OFFSET`], else 0.
/// Pixels outside the image are treated as copies of the nearest edge pixel.
pub fn adaptive_threshold(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let kernel = gaussian_kernel(ADAPTIVE_BLOCK_SIZE);
    let mean = gaussian_mean(gray, &kernel);
    let w = width as usize;

    GrayImage::from_fn(width, height, |x, y| {
        let idx = y as usize * w + x as usize;
        let local = mean[idx].round().clamp(0.0, 255.0) as i32;
        let value = gray.get_pixel(x, y).0[0] as i32;
        if value > local - ADAPTIVE_OFFSET {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// One dilation pass with a [`DILATION_RADIUS`] structuring element.
/// Expects a binary (0/255) image.
pub fn dilate_binary(binary: &GrayImage) -> GrayImage {
    dilate(binary, Norm::LInf, DILATION_RADIUS)
}

/// Normalized 1D Gaussian kernel; sigma follows from the kernel size
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;

    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for weight in kernel.iter_mut() {
        *weight /= sum;
    }
    kernel
}

/// Separable Gaussian blur with replicated borders, kept in f32
fn gaussian_mean(gray: &GrayImage, kernel: &[f32]) -> Vec<f32> {
    let w = gray.width() as usize;
    let h = gray.height() as usize;
    let radius = (kernel.len() / 2) as isize;
    let src = gray.as_raw();

    let mut horizontal = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - radius).clamp(0, w as isize - 1) as usize;
                acc += weight * src[y * w + sx] as f32;
            }
            horizontal[y * w + x] = acc;
        }
    }

    let mut result = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = (y as isize + k as isize - radius).clamp(0, h as isize - 1) as usize;
                acc += weight * horizontal[sy * w + x];
            }
            result[y * w + x] = acc;
        }
    }

    result
}
