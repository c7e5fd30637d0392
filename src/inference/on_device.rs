use crate::imaging::{to_chw_tensor, ImageVariant, InputTensor};

use super::{labels::default_catalog, ClassificationVote, InferenceEngine, InferenceError};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// A loaded model that maps one normalized tensor to raw class logits.
///
/// Loading the model file and running the runtime are the host's business;
/// only this call is needed here.
pub trait LogitModel: Send + Sync {
    fn logits(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError>;
}

/// On-device adapter: normalize, run, softmax, pick the arg-max label.
pub struct OnDeviceEngine<M> {
    model: M,
    labels: Vec<String>,
}

impl<M: LogitModel> OnDeviceEngine<M> {
    pub fn new(model: M, labels: Vec<String>) -> Self {
        Self { model, labels }
    }

    /// Engine over the bundled 20-class catalog.
    pub fn with_default_catalog(model: M) -> Self {
        Self::new(model, default_catalog())
    }
}

impl<M: LogitModel> InferenceEngine for OnDeviceEngine<M> {
    fn classify(&self, variant: &ImageVariant) -> Result<ClassificationVote, InferenceError> {
        if self.labels.is_empty() {
            return Err(InferenceError::Model("label catalog is empty".into()));
        }
        let tensor = to_chw_tensor(variant);
        let logits = self.model.logits(&tensor)?;

        if logits.len() != self.labels.len() {
            return Err(InferenceError::ShapeMismatch {
                expected: self.labels.len(),
                actual: logits.len(),
            });
        }
        if logits.iter().any(|value| !value.is_finite()) {
            return Err(InferenceError::Model("non-finite logit in model output".into()));
        }

        let probabilities = softmax(&logits);
        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            });

        let label = &self.labels[index];
        log_debug!(
            "{}: {} ({:.1}%)",
            variant.strategy(),
            label,
            confidence * 100.0
        );

        Ok(ClassificationVote::new(label.clone(), confidence))
    }
}

/// Softmax function for converting logits to probabilities.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_val = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_vals: Vec<f32> = logits.iter().map(|x| (x - max_val).exp()).collect();
    let sum: f32 = exp_vals.iter().sum();
    exp_vals.iter().map(|x| x / sum).collect()
}
