use serde::{Deserialize, Serialize};

use crate::imaging::VariantStrategy;

/// Largest square edge a variant may be resized to.
pub const MAX_INPUT_EDGE: u32 = 4_096;

/// Tunables for the multi-variant ensemble.
///
/// A variant list of just `[standard]` degrades to single-pass classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnsembleConfig {
    /// Variants generated per capture, in order.
    pub variants: Vec<VariantStrategy>,

    /// Square edge the engine expects, in pixels.
    pub input_edge: u32,

    /// Votes at or below this raw confidence are noise.
    pub confidence_floor: f32,

    /// Multiplier applied to rotten-category confidences
    pub rotten_boost: f32,

    /// A rotten label whose mean adjusted confidence exceeds this wins outright.
    pub rotten_override_gate: f32,

    /// Budget for one engine call; a late variant is dropped from the vote.
    pub variant_timeout_ms: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            variants: VariantStrategy::default_ensemble(),
            input_edge: 224,
            confidence_floor: 0.15,
            rotten_boost: 1.15,
            rotten_override_gate: 0.30,
            variant_timeout_ms: 2_000,
        }
    }
}
