use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::imaging::{CapturedImage, PreprocessError, Preprocessor, Variants};
use crate::inference::{ClassificationVote, InferenceEngine, InferenceError};

use super::aggregator::{aggregate, AggregatedDecision, AggregationError};
use super::config::EnsembleConfig;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Why the offline path produced no decision.
#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error("preprocessing worker failed: {0}")]
    Worker(String),
}

/// Fan the variants out to the engine, one blocking worker each, and collect
/// the votes that come back in time.
///
/// Failed or late variants are logged and left out. The returned votes are in
/// variant order regardless of completion order.
pub async fn collect_votes(
    engine: &Arc<dyn InferenceEngine>,
    variants: Variants,
    per_variant: Duration,
) -> Vec<ClassificationVote> {
    let timeout_ms = per_variant.as_millis() as u64;
    let mut workers = JoinSet::new();

    for (index, variant) in variants.enumerate() {
        let engine = Arc::clone(engine);
        workers.spawn(async move {
            let strategy = variant.strategy();
            let call = tokio::task::spawn_blocking(move || engine.classify(&variant));
            let result = match tokio::time::timeout(per_variant, call).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(InferenceError::Worker(join_err.to_string())),
                Err(_) => Err(InferenceError::TimedOut {
                    strategy,
                    timeout_ms,
                }),
            };
            (index, result)
        });
    }

    let mut ballots = Vec::with_capacity(workers.len());
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((index, Ok(vote))) => ballots.push((index, vote)),
            Ok((index, Err(err))) => log_warn!("variant {} dropped: {}", index, err),
            Err(err) => log_error!("variant task failed to join: {}", err),
        }
    }

    ballots.sort_by_key(|(index, _)| *index);
    ballots.into_iter().map(|(_, vote)| vote).collect()
}

/// Offline classification: preprocess, fan out, fuse.
#[derive(Clone)]
pub struct EnsembleClassifier {
    engine: Arc<dyn InferenceEngine>,
    preprocessor: Arc<Preprocessor>,
    config: EnsembleConfig,
}

impl EnsembleClassifier {
    pub fn new(engine: Arc<dyn InferenceEngine>, config: EnsembleConfig) -> Self {
        let preprocessor = Preprocessor::new(config.variants.clone(), config.input_edge);
        Self {
            engine,
            preprocessor: Arc::new(preprocessor),
            config,
        }
    }

    pub async fn classify(&self, image: CapturedImage) -> Result<AggregatedDecision, EnsembleError> {
        let preprocessor = Arc::clone(&self.preprocessor);
        let variants = tokio::task::spawn_blocking(move || preprocessor.preprocess(&image))
            .await
            .map_err(|err| EnsembleError::Worker(err.to_string()))??;

        let generated = variants.len();
        let votes = collect_votes(
            &self.engine,
            variants,
            Duration::from_millis(self.config.variant_timeout_ms),
        )
        .await;
        log_debug!("{} of {} variants voted", votes.len(), generated);

        let decision = aggregate(&votes, &self.config)?;
        log_info!(
            "ensemble decision: {} ({:.1}%, {} votes)",
            decision.label,
            decision.confidence * 100.0,
            decision.votes_for_label
        );
        Ok(decision)
    }
}
