use std::sync::Arc;

use thiserror::Error;
use tokio::{task, time};

use crate::connectivity::{select_mode, ConnectivityProbe, Mode};
use crate::ensemble::{AggregatedDecision, AggregationError, EnsembleClassifier, EnsembleError};
use crate::imaging::{CapturedImage, PreprocessError};
use crate::inference::{RemoteEngine, RemoteError};
use crate::settings::ThresholdConfig;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// A usable decision, plus what the UI needs to voice it.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub decision: AggregatedDecision,
    pub mode: Mode,
    /// Server-provided spoken verdict (online path only).
    pub audio_url: Option<String>,
}

/// A decision exists but is not trusted enough to announce.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("confidence {confidence:.2} for {item_type} is below {threshold:.2}")]
pub struct RejectedLowConfidence {
    pub item_type: String,
    pub confidence: f32,
    pub threshold: f32,
}

/// No usable decision at all.
#[derive(Debug, Error)]
pub enum AnalysisFailure {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("analysis exceeded {0}ms")]
    TimedOut(u64),
    #[error("analysis worker failed: {0}")]
    Worker(String),
}

impl From<EnsembleError> for AnalysisFailure {
    fn from(err: EnsembleError) -> Self {
        match err {
            EnsembleError::Preprocess(err) => AnalysisFailure::Preprocess(err),
            EnsembleError::Aggregation(err) => AnalysisFailure::Aggregation(err),
            EnsembleError::Worker(reason) => AnalysisFailure::Worker(reason),
        }
    }
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    Success(Verdict),
    Rejected(RejectedLowConfidence),
    Failed(AnalysisFailure),
}

/// Picks the online or offline path per capture and runs it to an outcome.
pub struct ModeSelector {
    probe: Arc<dyn ConnectivityProbe>,
    remote: RemoteEngine,
    ensemble: EnsembleClassifier,
    thresholds: ThresholdConfig,
}

impl ModeSelector {
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        remote: RemoteEngine,
        ensemble: EnsembleClassifier,
        thresholds: ThresholdConfig,
    ) -> Self {
        Self {
            probe,
            remote,
            ensemble,
            thresholds,
        }
    }

    /// Asks the probe every time; connectivity is never cached.
    pub fn select_mode(&self) -> Mode {
        select_mode(self.probe.as_ref())
    }

    pub async fn analyze(&self, mode: Mode, image: CapturedImage) -> AnalysisOutcome {
        let result = match mode {
            Mode::Online => self.classify_online(image).await,
            Mode::Offline => self
                .ensemble
                .classify(image)
                .await
                .map(|decision| Verdict {
                    decision,
                    mode,
                    audio_url: None,
                })
                .map_err(AnalysisFailure::from),
        };

        match result {
            Ok(verdict) => self.apply_threshold(verdict),
            Err(err) => {
                log_warn!("{:?} analysis failed: {}", mode, err);
                AnalysisOutcome::Failed(err)
            }
        }
    }

    /// One bounded attempt, no retry and no switch to the local model.
    async fn classify_online(&self, image: CapturedImage) -> Result<Verdict, AnalysisFailure> {
        let remote = self.remote.clone();
        let limit = remote.request_timeout();
        let call = task::spawn_blocking(move || remote.classify_capture(&image));

        let prediction = match time::timeout(limit, call).await {
            Ok(Ok(result)) => result?,
            Ok(Err(err)) => return Err(RemoteError::Worker(err.to_string()).into()),
            Err(_) => return Err(RemoteError::TimedOut(limit.as_millis() as u64).into()),
        };

        Ok(Verdict {
            decision: AggregatedDecision {
                label: prediction.prediction,
                item_type: prediction.label.item_type.clone(),
                is_fresh: prediction.label.is_fresh(),
                confidence: 1.0,
                votes_for_label: 1,
            },
            mode: Mode::Online,
            audio_url: prediction.audio_url,
        })
    }

    fn apply_threshold(&self, verdict: Verdict) -> AnalysisOutcome {
        let decision = &verdict.decision;
        let threshold = self.thresholds.threshold_for(&decision.item_type);

        if decision.confidence < threshold {
            log_info!(
                "{} at {:.2} is under the {:.2} threshold",
                decision.label,
                decision.confidence,
                threshold
            );
            return AnalysisOutcome::Rejected(RejectedLowConfidence {
                item_type: decision.item_type.clone(),
                confidence: decision.confidence,
                threshold,
            });
        }

        AnalysisOutcome::Success(verdict)
    }
}
