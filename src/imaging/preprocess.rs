use image::imageops::{self, FilterType};
use image::RgbImage;

use super::{CapturedImage, ImageVariant, PreprocessError, VariantError, VariantStrategy};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Variants in configuration order. Consumed once; cannot be restarted.
pub struct Variants {
    inner: std::vec::IntoIter<ImageVariant>,
}

impl Variants {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

impl Iterator for Variants {
    type Item = ImageVariant;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Variants {}

/// Turns one capture into the ensemble's input variants.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    strategies: Vec<VariantStrategy>,
    edge: u32,
}

impl Preprocessor {
    pub fn new(strategies: Vec<VariantStrategy>, edge: u32) -> Self {
        Self { strategies, edge }
    }

    /// Produce the variants for `image`.
    ///
    /// The `standard` variant is always first, whether or not the strategy
    /// list names it. Any other strategy that fails is logged and skipped;
    /// only a capture that cannot yield `standard` is an error.
    pub fn preprocess(&self, image: &CapturedImage) -> Result<Variants, PreprocessError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessError::SourceImageInvalid {
                width: image.width(),
                height: image.height(),
                reason: "image has no pixels",
            });
        }
        if self.edge == 0 {
            return Err(PreprocessError::SourceImageInvalid {
                width: image.width(),
                height: image.height(),
                reason: "engine input edge is zero",
            });
        }

        let standard_pixels = center_square(image.pixels(), image.shorter_edge(), self.edge);
        let standard = ImageVariant::new(VariantStrategy::Standard, standard_pixels, self.edge)
            .map_err(|err| {
                log_warn!("standard variant failed: {err}");
                PreprocessError::SourceImageInvalid {
                    width: image.width(),
                    height: image.height(),
                    reason: "standard variant could not be produced",
                }
            })?;

        let mut variants = Vec::with_capacity(self.strategies.len().max(1));

        for strategy in self.strategies.iter().copied() {
            if strategy == VariantStrategy::Standard {
                continue;
            }
            match self.derive(strategy, image, &standard) {
                Ok(variant) => {
                    log_debug!("produced variant {strategy}");
                    variants.push(variant);
                }
                Err(err) => log_warn!("skipping variant: {err}"),
            }
        }

        variants.insert(0, standard);

        Ok(Variants {
            inner: variants.into_iter(),
        })
    }

    fn derive(
        &self,
        strategy: VariantStrategy,
        image: &CapturedImage,
        standard: &ImageVariant,
    ) -> Result<ImageVariant, VariantError> {
        let pixels = match strategy {
            VariantStrategy::Standard => standard.pixels().clone(),
            VariantStrategy::Brighter { factor } | VariantStrategy::Darker { factor } => {
                if !factor.is_finite() || factor <= 0.0 {
                    return Err(VariantError::InvalidFactor { strategy, factor });
                }
                scale_intensity(standard.pixels(), factor)
            }
            VariantStrategy::PaddedCrop { scale } => {
                if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
                    return Err(VariantError::InvalidScale { strategy, scale });
                }
                let side = (image.shorter_edge() as f32 * scale).round() as u32;
                if side == 0 {
                    return Err(VariantError::EmptyCrop { strategy, side });
                }
                center_square(image.pixels(), side, self.edge)
            }
        };

        ImageVariant::new(strategy, pixels, self.edge)
    }
}

/// Crop a `side × side` square from the center, then resize to `edge × edge`.
fn center_square(source: &RgbImage, side: u32, edge: u32) -> RgbImage {
    let side = side.min(source.width()).min(source.height());
    let x = (source.width() - side) / 2;
    let y = (source.height() - side) / 2;
    let cropped = imageops::crop_imm(source, x, y, side, side).to_image();

    if side == edge {
        cropped
    } else {
        imageops::resize(&cropped, edge, edge, FilterType::Triangle)
    }
}

/// Multiply every RGB channel by `factor`, clamping to the u8 range.
fn scale_intensity(source: &RgbImage, factor: f32) -> RgbImage {
    let mut out = source.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (f32::from(*channel) * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
