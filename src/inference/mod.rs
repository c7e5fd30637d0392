//! The classification capability and its two adapters.
//!
//! Callers depend on [`InferenceEngine`] only. [`OnDeviceEngine`] wraps a
//! loaded model; [`RemoteEngine`] forwards to the classification service.
//! Both are blocking and are driven from `spawn_blocking` workers with a
//! per-call timeout by the ensemble runner and the mode selector.

pub mod labels;
pub mod on_device;
pub mod remote;

pub use labels::{default_catalog, parse_label, LabelCategory, LabelInfo};
pub use on_device::{softmax, LogitModel, OnDeviceEngine};
pub use remote::{ClassificationService, ClassificationUpload, RemoteEngine, RemoteError, RemotePrediction};

use serde::Serialize;
use thiserror::Error;

use crate::imaging::{ImageVariant, VariantStrategy};

/// One variant's classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationVote {
    pub label: String,
    pub raw_confidence: f32,
}

impl ClassificationVote {
    /// Confidence is clamped into [0, 1]; NaN becomes 0.
    pub fn new(label: impl Into<String>, raw_confidence: f32) -> Self {
        let raw_confidence = if raw_confidence.is_nan() {
            0.0
        } else {
            raw_confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            raw_confidence,
        }
    }
}

/// Stateful, thread-safe classifier. Must be safe for concurrent read-only
/// calls; the returned confidence is a probability, never a logit.
pub trait InferenceEngine: Send + Sync {
    fn classify(&self, variant: &ImageVariant) -> Result<ClassificationVote, InferenceError>;
}

/// A single engine call failed. Absorbed by the ensemble runner.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model execution failed: {0}")]
    Model(String),
    #[error("model produced {actual} scores for {expected} labels")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("{strategy} timed out after {timeout_ms}ms")]
    TimedOut {
        strategy: VariantStrategy,
        timeout_ms: u64,
    },
    #[error("inference worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
