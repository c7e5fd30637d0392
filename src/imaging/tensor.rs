//! Pixel-to-model and pixel-to-wire conversions.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::ImageVariant;

/// Default ImageNet normalization mean (RGB order).
pub const IMAGE_NET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Default ImageNet normalization standard deviation (RGB order).
pub const IMAGE_NET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A `1 × 3 × edge × edge` float tensor in CHW order.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub edge: u32,
    pub data: Vec<f32>,
}

impl InputTensor {
    pub fn shape(&self) -> [usize; 4] {
        let edge = self.edge as usize;
        [1, 3, edge, edge]
    }
}

/// Normalize a variant with ImageNet statistics, channel planes R, G, B.
pub fn to_chw_tensor(variant: &ImageVariant) -> InputTensor {
    let pixels = variant.pixels();
    let edge = variant.edge();
    let side = edge as usize;
    let plane = side * side;
    let mut data = vec![0.0f32; plane * 3];

    for (x, y, pixel) in pixels.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        for c in 0..3 {
            let value = f32::from(pixel.0[c]) / 255.0;
            data[c * plane + offset] = (value - IMAGE_NET_MEAN[c]) / IMAGE_NET_STD[c];
        }
    }

    InputTensor { edge, data }
}

/// Shrink by `downscale` per edge (never below 1px) and encode as JPEG for
/// upload to the classification service.
pub fn encode_upload_jpeg(
    pixels: &RgbImage,
    downscale: u32,
    quality: u8,
) -> Result<Vec<u8>, image::ImageError> {
    let downscale = downscale.max(1);
    let width = (pixels.width() / downscale).max(1);
    let height = (pixels.height() / downscale).max(1);

    let scaled;
    let source = if downscale == 1 {
        pixels
    } else {
        scaled = imageops::resize(pixels, width, height, FilterType::Triangle);
        &scaled
    };

    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder.encode_image(source)?;
    }
    Ok(buf.into_inner())
}
