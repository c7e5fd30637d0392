//! Offline multi-variant classification.
//!
//! Each capture becomes a handful of variants, each variant gets one vote
//! from the engine, and the votes are fused into a single decision that
//! deliberately leans toward "rotten".

mod aggregator;
mod config;
mod runner;

pub use aggregator::{aggregate, AggregatedDecision, AggregationError};
pub use config::{EnsembleConfig, MAX_INPUT_EDGE};
pub use runner::{collect_votes, EnsembleClassifier, EnsembleError};
