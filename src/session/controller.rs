use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connectivity::{ConnectivityProbe, Mode};
use crate::ensemble::EnsembleClassifier;
use crate::feedback::{FeedbackChannels, FeedbackPipeline, FeedbackState};
use crate::imaging::CapturedImage;
use crate::inference::{ClassificationService, InferenceEngine, RemoteEngine};
use crate::settings::{EngineConfig, SessionTimingConfig};

use super::events::{DisplayDirective, SessionEvent};
use super::mode::{AnalysisFailure, AnalysisOutcome, ModeSelector};
use super::state::{ActiveFeedback, EngineContext, ResultKind, SessionState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is busy ({0:?})")]
    Busy(SessionState),
    #[error("session has been shut down")]
    ShutDown,
}

/// Platform capabilities the coordinator is assembled from.
#[derive(Clone)]
pub struct EngineCollaborators {
    pub probe: Arc<dyn ConnectivityProbe>,
    /// On-device classifier used by the offline ensemble.
    pub engine: Arc<dyn InferenceEngine>,
    pub classification: Arc<dyn ClassificationService>,
    pub feedback: FeedbackChannels,
}

/// Owns the session state machine.
///
/// ```text
/// Idle -> Capturing -> Analyzing -> ShowingResult(..) -> Idle
///                                          |
///                                          +-> FeedbackPrompt -> Idle
/// ```
///
/// All transitions happen here; the host only feeds captures and UI actions
/// in and reads [`SessionEvent`]s out.
#[derive(Clone)]
pub struct SessionCoordinator {
    context: Arc<Mutex<EngineContext>>,
    selector: Arc<ModeSelector>,
    feedback: FeedbackPipeline,
    timing: SessionTimingConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    shutdown: CancellationToken,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionCoordinator {
    pub fn new(
        selector: ModeSelector,
        feedback: FeedbackPipeline,
        timing: SessionTimingConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let coordinator = Self {
            context: Arc::new(Mutex::new(EngineContext::new(timing.feedback_trigger_count))),
            selector: Arc::new(selector),
            feedback,
            timing,
            events,
            shutdown: CancellationToken::new(),
            worker: Arc::new(Mutex::new(None)),
        };
        (coordinator, receiver)
    }

    /// Wire every component from one configuration.
    pub fn from_config(
        config: &EngineConfig,
        collaborators: EngineCollaborators,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let remote = RemoteEngine::new(
            collaborators.classification,
            config.remote.clone(),
            config.device_id.clone(),
        );
        let ensemble = EnsembleClassifier::new(collaborators.engine, config.ensemble.clone());
        let selector = ModeSelector::new(
            Arc::clone(&collaborators.probe),
            remote,
            ensemble,
            config.thresholds.clone(),
        );
        let feedback = FeedbackPipeline::new(
            collaborators.feedback,
            collaborators.probe,
            config.feedback.clone(),
            config.device_id.clone(),
        );
        Self::new(selector, feedback, config.session.clone())
    }

    pub async fn state(&self) -> SessionState {
        self.context.lock().await.state
    }

    pub async fn analysis_count(&self) -> u32 {
        self.context.lock().await.counter.count()
    }

    pub async fn last_mode(&self) -> Option<Mode> {
        self.context.lock().await.last_mode
    }

    pub fn feedback_state(&self) -> FeedbackState {
        self.feedback.state()
    }

    /// Accept a capture and start analyzing it in the background.
    ///
    /// Only accepted from `Idle` with no feedback session running; anything
    /// else is dropped with [`SessionError::Busy`] and a
    /// [`SessionEvent::CaptureRejected`].
    pub async fn submit_capture(&self, image: CapturedImage) -> Result<(), SessionError> {
        let mode = {
            let mut context = self.context.lock().await;
            if context.shut_down {
                return Err(SessionError::ShutDown);
            }
            if !context.is_available() {
                let state = context.state;
                log_warn!("capture dropped while {:?}", state);
                self.emit(SessionEvent::CaptureRejected(state));
                return Err(SessionError::Busy(state));
            }

            self.transition(&mut context, SessionState::Capturing);
            let mode = self.selector.select_mode();
            context.last_mode = Some(mode);
            self.transition(&mut context, SessionState::Analyzing);
            mode
        };

        log_info!(
            "analyzing {}x{} capture ({:?})",
            image.width(),
            image.height(),
            mode
        );

        let this = self.clone();
        self.replace_worker(tokio::spawn(async move {
            this.run_cycle(mode, image).await;
        }))
        .await;
        Ok(())
    }

    /// Header action: record feedback now, outside the prompt cadence.
    pub async fn start_quick_feedback(&self) -> Result<(), SessionError> {
        let active = {
            let mut context = self.context.lock().await;
            if context.shut_down {
                return Err(SessionError::ShutDown);
            }
            if !context.is_available() {
                return Err(SessionError::Busy(context.state));
            }
            let active = ActiveFeedback::new();
            context.feedback = Some(active.clone());
            active
        };

        log_info!("quick feedback requested");
        self.emit(SessionEvent::FeedbackPrompt);

        let this = self.clone();
        self.replace_worker(tokio::spawn(async move {
            this.run_feedback(active, false).await;
        }))
        .await;
        Ok(())
    }

    /// End the recording early and submit what was captured. Ignored unless
    /// the microphone is actually running.
    pub async fn stop_feedback_recording(&self) -> bool {
        let context = self.context.lock().await;
        match &context.feedback {
            Some(active) if self.feedback.state() == FeedbackState::Recording => {
                active.controls.stop_recording();
                true
            }
            Some(_) => {
                log_debug!("stop ignored; feedback is {:?}", self.feedback.state());
                false
            }
            None => false,
        }
    }

    /// Close the prompt. Any recording is stopped and its clip discarded
    /// before this returns.
    pub async fn dismiss_feedback(&self) -> bool {
        let mut context = self.context.lock().await;
        let Some(active) = context.feedback.take() else {
            return false;
        };

        active.controls.cancel();
        self.feedback.abort_recording();
        log_info!("feedback dismissed");
        self.emit(SessionEvent::FeedbackDismissed);

        if context.state == SessionState::FeedbackPrompt {
            self.transition(&mut context, SessionState::Idle);
        }
        true
    }

    /// Cancel every timer and task, drop held buffers, refuse further work.
    pub async fn shutdown(&self) {
        {
            let mut context = self.context.lock().await;
            if context.shut_down {
                return;
            }
            context.shut_down = true;
            if let Some(active) = context.feedback.take() {
                active.controls.cancel();
            }
            context.state = SessionState::Idle;
        }

        self.shutdown.cancel();
        self.feedback.abort_recording();

        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(err) = handle.await {
                log_error!("session worker failed to join: {}", err);
            }
        }

        log_info!("session shut down");
        self.emit(SessionEvent::ShutDown);
    }

    async fn run_cycle(&self, mode: Mode, image: CapturedImage) {
        let limit = self.timing.analysis_timeout();
        let analysis = time::timeout(limit, self.selector.analyze(mode, image));

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            result = analysis => result.unwrap_or_else(|_| {
                log_warn!("analysis exceeded {}ms", self.timing.analysis_timeout_ms);
                AnalysisOutcome::Failed(AnalysisFailure::TimedOut(self.timing.analysis_timeout_ms))
            }),
        };

        let directive = DisplayDirective::for_outcome(&outcome, self.timing.result_display_ms);
        let kind = directive.result_kind();
        drop(outcome);

        {
            let mut context = self.context.lock().await;
            self.transition(&mut context, SessionState::ShowingResult(kind));
        }
        log_debug!("showing {:?} result: {}", kind, directive.text);
        self.emit(SessionEvent::ShowResult(directive));

        if !self.pause(self.timing.result_display()).await {
            return;
        }
        self.emit(SessionEvent::ClearResult);

        let prompt = {
            let mut context = self.context.lock().await;
            if context.shut_down {
                return;
            }
            let due = kind != ResultKind::Failed && context.counter.record_completed();
            if due {
                let active = ActiveFeedback::new();
                context.feedback = Some(active.clone());
                self.transition(&mut context, SessionState::FeedbackPrompt);
                Some(active)
            } else {
                self.transition(&mut context, SessionState::Idle);
                None
            }
        };

        if let Some(active) = prompt {
            log_info!("analysis count reached; prompting for feedback");
            self.run_feedback(active, true).await;
        }
    }

    async fn run_feedback(&self, active: ActiveFeedback, settle_first: bool) {
        let controls = &active.controls;

        if settle_first {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                _ = controls.cancelled() => return,
                _ = time::sleep(self.timing.settle_delay()) => {}
            }
            self.emit(SessionEvent::FeedbackPrompt);
        }

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            outcome = self.feedback.run(controls) => outcome,
        };
        log_debug!("feedback session ended: {:?}", outcome);

        if outcome.warrants_thanks() {
            let thanks = self.feedback.config().thanks_duration();
            self.emit(SessionEvent::ShowThanks {
                duration_ms: thanks.as_millis() as u64,
            });
            if !self.pause(thanks).await {
                return;
            }
            self.emit(SessionEvent::ClearThanks);
        }

        self.release_feedback(active.id).await;
    }

    /// Return to `Idle` unless the session was already dismissed or replaced.
    async fn release_feedback(&self, id: Uuid) {
        let mut context = self.context.lock().await;
        if !context.owns_feedback(id) {
            return;
        }
        context.feedback = None;
        self.feedback.finish();
        if context.state == SessionState::FeedbackPrompt {
            self.transition(&mut context, SessionState::Idle);
        }
    }

    /// Sleep unless shut down first. Returns false on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = time::sleep(duration) => true,
        }
    }

    fn transition(&self, context: &mut EngineContext, state: SessionState) {
        context.state = state;
        self.emit(SessionEvent::StateChanged(state));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn replace_worker(&self, handle: JoinHandle<()>) {
        // The previous task has already released the session; let it finish.
        *self.worker.lock().await = Some(handle);
    }
}

