// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared image-to-tensor preprocessing for the ONNX model adapters

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;

/// Input size for the prompt-conditioned detector (square letterbox)
pub const DETECTOR_INPUT_SIZE: u32 = 1024;

/// Input size for the text-localization model
pub const LOCALIZER_INPUT_SIZE: u32 = 640;

/// Recognition input height
pub const REC_INPUT_HEIGHT: u32 = 48;

/// Maximum recognition input width
pub const REC_MAX_WIDTH: u32 = 320;

/// Mean values for normalization (ImageNet)
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Std values for normalization (ImageNet)
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Channel order expected by a model input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    /// Models trained on OpenCV-style input want blue first
    Bgr,
}

/// Normalize an RGB image into an NCHW `[1, 3, H, W]` tensor
pub fn image_to_nchw(rgb: &RgbImage, order: ChannelOrder) -> Array4<f32> {
    let (width, height) = rgb.dimensions();
    let mut tensor = Array4::zeros((1, 3, height as usize, width as usize));

    for y in 0..height as usize {
        for x in 0..width as usize {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            for c in 0..3 {
                let src = match order {
                    ChannelOrder::Rgb => c,
                    ChannelOrder::Bgr => 2 - c,
                };
                tensor[[0, c, y, x]] = (pixel[src] as f32 / 255.0 - MEAN[src]) / STD[src];
            }
        }
    }
    tensor
}

/// Normalize into a single-channel `[1, 1, H, W]` grayscale tensor
pub fn image_to_gray_nchw(rgb: &RgbImage) -> Array4<f32> {
    let (width, height) = rgb.dimensions();
    let mut tensor = Array4::zeros((1, 1, height as usize, width as usize));

    for y in 0..height as usize {
        for x in 0..width as usize {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            let luma = 0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;
            tensor[[0, 0, y, x]] = luma / 255.0 * 2.0 - 1.0;
        }
    }
    tensor
}

/// Result of a top-left-anchored letterbox resize
pub struct Letterbox {
    pub image: RgbImage,
    /// Multiply model-space coordinates by the inverse of this to get back
    /// to original pixels
    pub scale: f32,
}

/// Scale into a `target x target` square, pad bottom/right with gray
///
/// Anchoring the content at the top-left keeps the inverse mapping a plain
/// division by `scale`.
pub fn letterbox(image: &DynamicImage, target: u32) -> Letterbox {
    let (orig_w, orig_h) = image.dimensions();
    if orig_w == 0 || orig_h == 0 {
        return Letterbox {
            image: RgbImage::from_pixel(target, target, Rgb([128, 128, 128])),
            scale: 1.0,
        };
    }

    let scale = target as f32 / orig_w.max(orig_h) as f32;
    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target);

    let resized = image
        .resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let mut canvas = RgbImage::from_pixel(target, target, Rgb([128, 128, 128]));
    image::imageops::replace(&mut canvas, &resized, 0, 0);

    Letterbox {
        image: canvas,
        scale,
    }
}

/// Resize a crop to the recognition height, preserving aspect ratio
pub fn resize_for_recognition(crop: &RgbImage, max_width: Option<u32>) -> RgbImage {
    let (orig_w, orig_h) = crop.dimensions();
    let scale = REC_INPUT_HEIGHT as f32 / orig_h.max(1) as f32;
    let mut new_width = ((orig_w as f32 * scale).round() as u32).max(4);
    if let Some(max) = max_width {
        new_width = new_width.min(max);
    }

    image::imageops::resize(
        crop,
        new_width,
        REC_INPUT_HEIGHT,
        image::imageops::FilterType::Lanczos3,
    )
}
