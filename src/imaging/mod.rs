//! Captured frames and the derived variants fed to the inference engine.

pub mod preprocess;
pub mod tensor;

pub use preprocess::{Preprocessor, Variants};
pub use tensor::{encode_upload_jpeg, to_chw_tensor, InputTensor, IMAGE_NET_MEAN, IMAGE_NET_STD};

use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One photo handed over by the camera collaborator.
///
/// Immutable once built. The analysis that receives it owns it and drops it
/// as soon as a decision exists.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pixels: RgbImage,
}

impl CapturedImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Build from a tightly packed RGB8 buffer.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PreprocessError> {
        RgbImage::from_raw(width, height, data)
            .map(Self::new)
            .ok_or(PreprocessError::SourceImageInvalid {
                width,
                height,
                reason: "pixel buffer length does not match dimensions",
            })
    }

    /// Decode an encoded photo (JPEG, PNG, ...) as delivered by the camera.
    pub fn decode(bytes: &[u8]) -> Result<Self, PreprocessError> {
        let decoded = image::load_from_memory(bytes).map_err(|err| {
            PreprocessError::Decode(err.to_string())
        })?;
        Ok(Self::new(decoded.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn shorter_edge(&self) -> u32 {
        self.width().min(self.height())
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// How a variant was derived from the capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VariantStrategy {
    /// Center square crop to the shorter edge, resized to the engine edge.
    Standard,
    /// Standard variant with every channel scaled up by `factor`.
    Brighter { factor: f32 },
    /// Standard variant with every channel scaled down by `factor`.
    Darker { factor: f32 },
    /// Center square crop of `scale × shorterEdge`, resized to the engine edge.
    PaddedCrop { scale: f32 },
}

impl VariantStrategy {
    /// The ensemble used when the configuration does not name one.
    pub fn default_ensemble() -> Vec<VariantStrategy> {
        vec![
            VariantStrategy::Standard,
            VariantStrategy::Brighter { factor: 1.2 },
            VariantStrategy::Darker { factor: 0.8 },
            VariantStrategy::PaddedCrop { scale: 0.9 },
        ]
    }
}

impl fmt::Display for VariantStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Brighter { factor } => write!(f, "brighter({factor})"),
            Self::Darker { factor } => write!(f, "darker({factor})"),
            Self::PaddedCrop { scale } => write!(f, "paddedCrop({scale})"),
        }
    }
}

/// A square, engine-sized derivative of a [`CapturedImage`].
#[derive(Debug, Clone)]
pub struct ImageVariant {
    strategy: VariantStrategy,
    pixels: RgbImage,
}

impl ImageVariant {
    /// Only the preprocessor builds variants, so the square/edge invariant is
    /// checked here once instead of at every consumer.
    pub(crate) fn new(strategy: VariantStrategy, pixels: RgbImage, edge: u32) -> Result<Self, VariantError> {
        if pixels.width() != edge || pixels.height() != edge {
            return Err(VariantError::WrongShape {
                strategy,
                width: pixels.width(),
                height: pixels.height(),
                edge,
            });
        }
        Ok(Self { strategy, pixels })
    }

    pub fn strategy(&self) -> VariantStrategy {
        self.strategy
    }

    pub fn edge(&self) -> u32 {
        self.pixels.width()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// The capture itself is unusable; fatal for the capture.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("source image invalid ({width}x{height}): {reason}")]
    SourceImageInvalid {
        width: u32,
        height: u32,
        reason: &'static str,
    },
    #[error("failed to decode captured photo: {0}")]
    Decode(String),
}

/// One variant could not be produced. Absorbed by the preprocessor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VariantError {
    #[error("{strategy}: factor {factor} must be finite and positive")]
    InvalidFactor { strategy: VariantStrategy, factor: f32 },
    #[error("{strategy}: crop scale {scale} must lie in (0, 1]")]
    InvalidScale { strategy: VariantStrategy, scale: f32 },
    #[error("{strategy}: crop of {side}px is empty")]
    EmptyCrop { strategy: VariantStrategy, side: u32 },
    #[error("{strategy}: produced {width}x{height}, expected {edge}x{edge}")]
    WrongShape {
        strategy: VariantStrategy,
        width: u32,
        height: u32,
        edge: u32,
    },
}
