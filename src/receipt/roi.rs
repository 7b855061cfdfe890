//! Region-of-interest crops for re-reading a single value

use image::imageops;
use image::GrayImage;

use crate::vision::preprocess::adaptive_threshold;
use crate::vision::BoundingBox;

/// Grow `bounds` by `margin` on every side, clamped to a `width` x `height`
/// image. `None` if nothing of the region lies inside the image.
pub fn expand_and_clamp(bounds: &BoundingBox, margin: u32, width: u32, height: u32) -> Option<BoundingBox> {
    let left = bounds.left.saturating_sub(margin);
    let top = bounds.top.saturating_sub(margin);
    if left >= width || top >= height {
        return None;
    }

    let roi_width = bounds
        .width
        .saturating_add(margin.saturating_mul(2))
        .min(width - left);
    let roi_height = bounds
        .height
        .saturating_add(margin.saturating_mul(2))
        .min(height - top);

    let roi = BoundingBox::new(left, top, roi_width, roi_height);
    if roi.is_empty() {
        None
    } else {
        Some(roi)
    }
}

/// Crop the expanded region out of a grayscale source and binarize it
pub fn extract_roi(gray: &GrayImage, bounds: &BoundingBox, margin: u32) -> Option<GrayImage> {
    let (width, height) = gray.dimensions();
    let roi = expand_and_clamp(bounds, margin, width, height)?;
    let crop = imageops::crop_imm(gray, roi.left, roi.top, roi.width, roi.height).to_image();
    Some(adaptive_threshold(&crop))
}
