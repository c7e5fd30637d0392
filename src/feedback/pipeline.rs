use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task, time};
use tokio_util::sync::CancellationToken;

use crate::connectivity::ConnectivityProbe;
use crate::settings::FeedbackConfig;

use super::channels::{
    AudioClip, AudioRecorder, FallbackDispatcher, FallbackHandoff, FeedbackService,
    FeedbackSubmission, SubmitResponse,
};
use super::{FeedbackError, FeedbackOutcome, FeedbackState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// MIME type the hand-off advertises for the attachment.
const HANDOFF_ATTACHMENT_TYPE: &str = "audio/mp3";

/// The three collaborators one feedback session talks to.
#[derive(Clone)]
pub struct FeedbackChannels {
    pub recorder: Arc<dyn AudioRecorder>,
    pub service: Arc<dyn FeedbackService>,
    pub fallback: Arc<dyn FallbackDispatcher>,
}

/// Signals into a running session. `stop` ends recording early and submits,
/// `cancel` drops everything.
#[derive(Debug, Clone, Default)]
pub struct FeedbackControls {
    stop: CancellationToken,
    cancel: CancellationToken,
}

impl FeedbackControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_recording(&self) {
        self.stop.cancel();
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once [`cancel`](FeedbackControls::cancel) has been called.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[derive(Clone)]
pub struct FeedbackPipeline {
    channels: FeedbackChannels,
    probe: Arc<dyn ConnectivityProbe>,
    config: FeedbackConfig,
    device_id: String,
    state: Arc<watch::Sender<FeedbackState>>,
}

impl FeedbackPipeline {
    pub fn new(
        channels: FeedbackChannels,
        probe: Arc<dyn ConnectivityProbe>,
        config: FeedbackConfig,
        device_id: String,
    ) -> Self {
        let (state, _) = watch::channel(FeedbackState::Idle);
        Self {
            channels,
            probe,
            config,
            device_id,
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    pub fn state(&self) -> FeedbackState {
        *self.state.borrow()
    }

    /// Record, then deliver through the primary channel or the fallback.
    ///
    /// Leaves the pipeline in the outcome's final state; [`finish`] returns
    /// it to `Idle` once the acknowledgment is done.
    ///
    /// [`finish`]: FeedbackPipeline::finish
    pub async fn run(&self, controls: &FeedbackControls) -> FeedbackOutcome {
        if controls.is_cancelled() {
            return FeedbackOutcome::Discarded;
        }

        if let Err(err) = self.channels.recorder.start() {
            log_error!("could not start feedback recording: {}", err);
            self.set_state(FeedbackState::Idle);
            return FeedbackOutcome::Discarded;
        }
        self.set_state(FeedbackState::Recording);
        log_info!(
            "recording feedback for up to {}ms",
            self.config.recording_window_ms
        );

        tokio::select! {
            biased;
            _ = controls.cancelled() => {
                log_info!("feedback recording cancelled");
                self.abort_recording();
                return FeedbackOutcome::Discarded;
            }
            _ = controls.stop.cancelled() => log_debug!("recording stopped early"),
            _ = time::sleep(self.config.recording_window()) => log_debug!("recording window elapsed"),
        }

        let clip = match self.channels.recorder.stop() {
            Ok(clip) if !clip.is_empty() => clip,
            Ok(_) => {
                log_warn!("feedback recording came back empty; nothing to submit");
                self.set_state(FeedbackState::Idle);
                return FeedbackOutcome::Discarded;
            }
            Err(err) => {
                log_error!("could not stop feedback recording: {}", err);
                self.abort_recording();
                return FeedbackOutcome::Discarded;
            }
        };

        self.set_state(FeedbackState::Submitting);
        let outcome = tokio::select! {
            biased;
            _ = controls.cancelled() => {
                log_info!("feedback submission abandoned");
                self.set_state(FeedbackState::Idle);
                return FeedbackOutcome::Discarded;
            }
            outcome = self.submit(clip) => outcome,
        };

        self.set_state(outcome.final_state());
        outcome
    }

    /// Stop any recording and throw the partial clip away. Synchronous.
    pub fn abort_recording(&self) {
        self.channels.recorder.discard();
        self.set_state(FeedbackState::Idle);
    }

    pub fn finish(&self) {
        self.set_state(FeedbackState::Idle);
    }

    async fn submit(&self, clip: AudioClip) -> FeedbackOutcome {
        let reason = if self.probe.is_online() {
            match self.submit_primary(clip.clone()).await {
                Ok(feedback_id) => {
                    log_info!("feedback delivered (id: {:?})", feedback_id);
                    return FeedbackOutcome::Delivered { feedback_id };
                }
                Err(err) => err,
            }
        } else {
            FeedbackError::Offline
        };

        log_warn!("primary feedback channel failed ({}); using fallback", reason);
        match self.dispatch_fallback(clip).await {
            Ok(()) => {
                log_info!("feedback handed off to {}", self.config.fallback_package);
                FeedbackOutcome::FallbackSent
            }
            Err(err) => {
                log_error!("fallback feedback dispatch failed: {}", err);
                FeedbackOutcome::FallbackFailed
            }
        }
    }

    async fn submit_primary(&self, clip: AudioClip) -> Result<Option<String>, FeedbackError> {
        let service = Arc::clone(&self.channels.service);
        let submission = FeedbackSubmission::new(self.device_id.clone(), clip);
        log_debug!(
            "submitting {} ({} bytes)",
            submission.voice_message.file_name,
            submission.voice_message.bytes.len()
        );

        let reply = run_blocking(self.config.upload_timeout(), "feedback upload", move || {
            service.submit_feedback(&submission).map_err(FeedbackError::from)
        })
        .await?;

        if !reply.is_success() {
            return Err(FeedbackError::Status(reply.status));
        }

        // Only success matters; an id is a bonus.
        let body: SubmitResponse = serde_json::from_slice(&reply.body).unwrap_or_default();
        Ok(body.feedback_id)
    }

    async fn dispatch_fallback(&self, clip: AudioClip) -> Result<(), FeedbackError> {
        let fallback = Arc::clone(&self.channels.fallback);
        let handoff = FallbackHandoff {
            recipient: self.config.fallback_recipient.clone(),
            package: self.config.fallback_package.clone(),
            caption: self.config.fallback_caption.clone(),
            attachment_type: HANDOFF_ATTACHMENT_TYPE,
            clip,
        };

        run_blocking(self.config.dispatch_timeout(), "fallback dispatch", move || {
            fallback.dispatch(&handoff)
        })
        .await
    }

    fn set_state(&self, state: FeedbackState) {
        self.state.send_replace(state);
    }
}

async fn run_blocking<T, F>(limit: Duration, stage: &'static str, work: F) -> Result<T, FeedbackError>
where
    F: FnOnce() -> Result<T, FeedbackError> + Send + 'static,
    T: Send + 'static,
{
    match time::timeout(limit, task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => Err(FeedbackError::Worker(err.to_string())),
        Err(_) => Err(FeedbackError::TimedOut {
            stage,
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
