use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Instant};

use marketmate_lib::feedback::{
    AudioClip, AudioRecorder, FallbackDispatcher, FallbackHandoff, FeedbackChannels, FeedbackError,
    FeedbackService, FeedbackState, FeedbackSubmission,
};
use marketmate_lib::imaging::{CapturedImage, ImageVariant, VariantStrategy};
use marketmate_lib::inference::{
    ClassificationService, ClassificationUpload, ClassificationVote, InferenceEngine,
    InferenceError,
};
use marketmate_lib::session::{
    AudioCue, DirectiveKind, EngineCollaborators, ResultKind, SessionCoordinator, SessionError,
    SessionEvent, SessionState,
};
use marketmate_lib::settings::EngineConfig;
use marketmate_lib::wire::{HttpReply, TransportFault};
use marketmate_lib::Mode;

struct ScriptedEngine {
    vote: Mutex<Option<(String, f32)>>,
}

impl InferenceEngine for ScriptedEngine {
    fn classify(&self, _variant: &ImageVariant) -> Result<ClassificationVote, InferenceError> {
        match self.vote.lock().unwrap().clone() {
            Some((label, confidence)) => Ok(ClassificationVote::new(label, confidence)),
            None => Err(InferenceError::Model("model not loaded".into())),
        }
    }
}

struct ScriptedClassifier {
    reply: Result<HttpReply, TransportFault>,
}

impl ClassificationService for ScriptedClassifier {
    fn upload_image(&self, _upload: &ClassificationUpload) -> Result<HttpReply, TransportFault> {
        self.reply.clone()
    }
}

#[derive(Default)]
struct MockRecorder {
    started: AtomicUsize,
    discarded: AtomicUsize,
}

impl AudioRecorder for MockRecorder {
    fn start(&self) -> Result<(), FeedbackError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<AudioClip, FeedbackError> {
        Ok(AudioClip::new(b"voice".to_vec()))
    }

    fn discard(&self) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockFeedbackService {
    status: u16,
    calls: AtomicUsize,
}

impl FeedbackService for MockFeedbackService {
    fn submit_feedback(&self, _submission: &FeedbackSubmission) -> Result<HttpReply, TransportFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HttpReply::new(self.status, r#"{"feedback_id":"fb-1"}"#))
    }
}

struct MockFallback {
    succeed: bool,
    handoffs: Mutex<Vec<FallbackHandoff>>,
}

impl FallbackDispatcher for MockFallback {
    fn dispatch(&self, handoff: &FallbackHandoff) -> Result<(), FeedbackError> {
        self.handoffs.lock().unwrap().push(handoff.clone());
        if self.succeed {
            Ok(())
        } else {
            Err(FeedbackError::Dispatch("no messaging app".into()))
        }
    }
}

struct Harness {
    coordinator: SessionCoordinator,
    events: UnboundedReceiver<SessionEvent>,
    online: Arc<AtomicBool>,
    engine: Arc<ScriptedEngine>,
    recorder: Arc<MockRecorder>,
    feedback_service: Arc<MockFeedbackService>,
    fallback: Arc<MockFallback>,
}

struct HarnessOptions {
    online: bool,
    classifier_reply: Result<HttpReply, TransportFault>,
    feedback_status: u16,
    fallback_ok: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            online: false,
            classifier_reply: Ok(HttpReply::new(200, r#"{"prediction":"Fresh Apple"}"#)),
            feedback_status: 200,
            fallback_ok: true,
        }
    }
}

fn harness(options: HarnessOptions) -> Harness {
    let online = Arc::new(AtomicBool::new(options.online));
    let engine = Arc::new(ScriptedEngine {
        vote: Mutex::new(Some(("FreshApple".into(), 0.9))),
    });
    let recorder = Arc::new(MockRecorder::default());
    let feedback_service = Arc::new(MockFeedbackService {
        status: options.feedback_status,
        calls: AtomicUsize::new(0),
    });
    let fallback = Arc::new(MockFallback {
        succeed: options.fallback_ok,
        handoffs: Mutex::new(Vec::new()),
    });

    let mut config = EngineConfig::default();
    config.device_id = "test-device".into();
    config.ensemble.variants = vec![VariantStrategy::Standard];
    config.ensemble.input_edge = 8;

    let probe_flag = Arc::clone(&online);
    let collaborators = EngineCollaborators {
        probe: Arc::new(move || probe_flag.load(Ordering::SeqCst)),
        engine: engine.clone(),
        classification: Arc::new(ScriptedClassifier {
            reply: options.classifier_reply,
        }),
        feedback: FeedbackChannels {
            recorder: recorder.clone(),
            service: feedback_service.clone(),
            fallback: fallback.clone(),
        },
    };

    let (coordinator, events) = SessionCoordinator::from_config(&config, collaborators);
    Harness {
        coordinator,
        events,
        online,
        engine,
        recorder,
        feedback_service,
        fallback,
    }
}

fn capture() -> CapturedImage {
    CapturedImage::new(RgbImage::from_pixel(16, 12, Rgb([120, 180, 60])))
}

async fn next_matching<F>(events: &mut UnboundedReceiver<SessionEvent>, wanted: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    time::timeout(Duration::from_secs(120), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

async fn settle_to_idle(events: &mut UnboundedReceiver<SessionEvent>) {
    next_matching(events, |e| {
        matches!(
            e,
            SessionEvent::StateChanged(SessionState::Idle)
                | SessionEvent::StateChanged(SessionState::FeedbackPrompt)
        )
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn result_stays_up_for_the_full_display_duration() {
    let mut h = harness(HarnessOptions::default());

    h.coordinator.submit_capture(capture()).await.unwrap();

    let shown = next_matching(&mut h.events, |e| matches!(e, SessionEvent::ShowResult(_))).await;
    let shown_at = Instant::now();
    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ClearResult)).await;

    assert!(shown_at.elapsed() >= Duration::from_millis(3_000));
    match shown {
        SessionEvent::ShowResult(directive) => {
            assert_eq!(directive.kind, DirectiveKind::Success);
            assert_eq!(directive.duration_ms, 3_000);
            assert_eq!(directive.text, "Fresh Apple");
            assert_eq!(
                directive.audio,
                AudioCue::Bundled {
                    asset: "FreshApple.mp3".into()
                }
            );
        }
        other => panic!("unexpected event {other:?}"),
    }

    settle_to_idle(&mut h.events).await;
    assert_eq!(h.coordinator.state().await, SessionState::Idle);
    assert_eq!(h.coordinator.analysis_count().await, 1);
    assert_eq!(h.coordinator.last_mode().await, Some(Mode::Offline));
}

#[tokio::test(start_paused = true)]
async fn capture_and_feedback_are_refused_while_analyzing() {
    let mut h = harness(HarnessOptions::default());

    h.coordinator.submit_capture(capture()).await.unwrap();
    assert_eq!(h.coordinator.state().await, SessionState::Analyzing);

    assert_eq!(
        h.coordinator.submit_capture(capture()).await,
        Err(SessionError::Busy(SessionState::Analyzing))
    );
    assert_eq!(
        h.coordinator.start_quick_feedback().await,
        Err(SessionError::Busy(SessionState::Analyzing))
    );
    assert_eq!(h.recorder.started.load(Ordering::SeqCst), 0);

    next_matching(&mut h.events, |e| {
        matches!(e, SessionEvent::CaptureRejected(SessionState::Analyzing))
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn fifth_completed_analysis_prompts_for_feedback() {
    let mut h = harness(HarnessOptions {
        online: true,
        ..HarnessOptions::default()
    });

    for round in 1..=4 {
        h.coordinator.submit_capture(capture()).await.unwrap();
        next_matching(&mut h.events, |e| {
            matches!(e, SessionEvent::StateChanged(SessionState::Idle))
        })
        .await;
        assert_eq!(h.coordinator.analysis_count().await, round);
    }

    h.coordinator.submit_capture(capture()).await.unwrap();
    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ClearResult)).await;
    let cleared_at = Instant::now();
    next_matching(&mut h.events, |e| {
        matches!(e, SessionEvent::StateChanged(SessionState::FeedbackPrompt))
    })
    .await;
    assert_eq!(h.coordinator.analysis_count().await, 0);

    // Captures are refused while the prompt is pending.
    assert_eq!(
        h.coordinator.submit_capture(capture()).await,
        Err(SessionError::Busy(SessionState::FeedbackPrompt))
    );

    next_matching(&mut h.events, |e| matches!(e, SessionEvent::FeedbackPrompt)).await;
    assert!(cleared_at.elapsed() >= Duration::from_millis(5_000));
    assert_eq!(h.recorder.started.load(Ordering::SeqCst), 1);

    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ShowThanks { .. })).await;
    assert_eq!(h.feedback_service.calls.load(Ordering::SeqCst), 1);
    assert!(h.fallback.handoffs.lock().unwrap().is_empty());

    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ClearThanks)).await;
    next_matching(&mut h.events, |e| {
        matches!(e, SessionEvent::StateChanged(SessionState::Idle))
    })
    .await;
    assert_eq!(h.coordinator.feedback_state(), FeedbackState::Idle);
    assert!(h.coordinator.submit_capture(capture()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn failed_analyses_do_not_count_toward_the_prompt() {
    let mut h = harness(HarnessOptions::default());
    *h.engine.vote.lock().unwrap() = None;

    for _ in 0..6 {
        h.coordinator.submit_capture(capture()).await.unwrap();
        let shown = next_matching(&mut h.events, |e| matches!(e, SessionEvent::ShowResult(_))).await;
        match shown {
            SessionEvent::ShowResult(directive) => assert_eq!(directive.kind, DirectiveKind::Error),
            other => panic!("unexpected event {other:?}"),
        }
        next_matching(&mut h.events, |e| {
            matches!(e, SessionEvent::StateChanged(SessionState::Idle))
        })
        .await;
    }
    assert_eq!(h.coordinator.analysis_count().await, 0);

    *h.engine.vote.lock().unwrap() = Some(("RottenMango".into(), 0.3));
    h.coordinator.submit_capture(capture()).await.unwrap();
    // 0.3 * 1.15 sits under the 0.6 threshold: unclear, but still counted.
    next_matching(&mut h.events, |e| {
        matches!(
            e,
            SessionEvent::StateChanged(SessionState::ShowingResult(ResultKind::Rejected))
        )
    })
    .await;
    settle_to_idle(&mut h.events).await;
    assert_eq!(h.coordinator.analysis_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_primary_submission_falls_back_once_and_still_thanks() {
    let mut h = harness(HarnessOptions {
        online: true,
        feedback_status: 500,
        fallback_ok: false,
        ..HarnessOptions::default()
    });

    h.coordinator.start_quick_feedback().await.unwrap();
    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ShowThanks { .. })).await;

    assert_eq!(h.feedback_service.calls.load(Ordering::SeqCst), 1);
    let handoffs = h.fallback.handoffs.lock().unwrap().clone();
    assert_eq!(handoffs.len(), 1);
    assert_eq!(handoffs[0].recipient, "marketmate-feedback");
    assert_eq!(handoffs[0].clip, AudioClip::new(b"voice".to_vec()));

    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ClearThanks)).await;
    assert_eq!(h.fallback.handoffs.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn offline_feedback_goes_straight_to_the_fallback() {
    let mut h = harness(HarnessOptions::default());

    h.coordinator.start_quick_feedback().await.unwrap();
    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ShowThanks { .. })).await;

    assert_eq!(h.feedback_service.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.fallback.handoffs.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dismissing_discards_the_recording() {
    let mut h = harness(HarnessOptions {
        online: true,
        ..HarnessOptions::default()
    });

    h.coordinator.start_quick_feedback().await.unwrap();
    assert_eq!(
        h.coordinator.submit_capture(capture()).await,
        Err(SessionError::Busy(SessionState::Idle))
    );

    time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(h.coordinator.feedback_state(), FeedbackState::Recording);

    assert!(h.coordinator.dismiss_feedback().await);
    assert!(h.recorder.discarded.load(Ordering::SeqCst) >= 1);
    assert_eq!(h.coordinator.feedback_state(), FeedbackState::Idle);

    time::sleep(Duration::from_millis(10_000)).await;
    assert_eq!(h.feedback_service.calls.load(Ordering::SeqCst), 0);
    assert!(h.fallback.handoffs.lock().unwrap().is_empty());

    while let Ok(event) = h.events.try_recv() {
        assert!(!matches!(event, SessionEvent::ShowThanks { .. }));
    }
    assert!(h.coordinator.submit_capture(capture()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn manual_stop_submits_before_the_window() {
    let mut h = harness(HarnessOptions {
        online: true,
        ..HarnessOptions::default()
    });

    h.coordinator.start_quick_feedback().await.unwrap();
    let started = Instant::now();
    time::sleep(Duration::from_millis(1_000)).await;
    assert!(h.coordinator.stop_feedback_recording().await);

    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ShowThanks { .. })).await;
    assert!(started.elapsed() < Duration::from_millis(7_000));
    assert_eq!(h.feedback_service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_before_recording_starts_is_ignored() {
    let mut h = harness(HarnessOptions {
        online: true,
        ..HarnessOptions::default()
    });

    for _ in 0..5 {
        h.coordinator.submit_capture(capture()).await.unwrap();
        settle_to_idle(&mut h.events).await;
    }
    assert_eq!(h.coordinator.state().await, SessionState::FeedbackPrompt);

    // Still inside the settle delay: nothing is recording yet.
    time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(h.coordinator.feedback_state(), FeedbackState::Idle);
    assert!(!h.coordinator.stop_feedback_recording().await);

    next_matching(&mut h.events, |e| matches!(e, SessionEvent::FeedbackPrompt)).await;
    let recording_from = Instant::now();
    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ShowThanks { .. })).await;

    // The full window ran instead of an instant, empty stop.
    assert!(recording_from.elapsed() >= Duration::from_millis(7_000));
    assert_eq!(h.feedback_service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn online_verdict_carries_the_server_audio() {
    let mut h = harness(HarnessOptions {
        online: true,
        classifier_reply: Ok(HttpReply::new(
            200,
            r#"{"prediction":"Rotten Banana","audio_file":"/audio/rotten_banana.mp3"}"#,
        )),
        ..HarnessOptions::default()
    });

    h.coordinator.submit_capture(capture()).await.unwrap();
    let shown = next_matching(&mut h.events, |e| matches!(e, SessionEvent::ShowResult(_))).await;

    match shown {
        SessionEvent::ShowResult(directive) => {
            assert_eq!(directive.kind, DirectiveKind::Success);
            assert_eq!(directive.text, "Rotten Banana");
            assert_eq!(
                directive.audio,
                AudioCue::Remote {
                    url: "http://192.168.1.3:8080/audio/rotten_banana.mp3".into()
                }
            );
            let decision = directive.decision.expect("success carries the decision");
            assert!(!decision.is_fresh);
            assert_eq!(decision.confidence, 1.0);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn remote_failure_shows_an_error_and_is_not_counted() {
    let mut h = harness(HarnessOptions {
        online: true,
        classifier_reply: Err(TransportFault("connection refused".into())),
        ..HarnessOptions::default()
    });

    h.coordinator.submit_capture(capture()).await.unwrap();
    next_matching(&mut h.events, |e| {
        matches!(
            e,
            SessionEvent::StateChanged(SessionState::ShowingResult(ResultKind::Failed))
        )
    })
    .await;
    settle_to_idle(&mut h.events).await;
    assert_eq!(h.coordinator.analysis_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn connectivity_is_checked_per_capture() {
    let mut h = harness(HarnessOptions::default());

    h.coordinator.submit_capture(capture()).await.unwrap();
    settle_to_idle(&mut h.events).await;
    assert_eq!(h.coordinator.last_mode().await, Some(Mode::Offline));

    h.online.store(true, Ordering::SeqCst);
    h.coordinator.submit_capture(capture()).await.unwrap();
    settle_to_idle(&mut h.events).await;
    assert_eq!(h.coordinator.last_mode().await, Some(Mode::Online));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_timers_and_refuses_work() {
    let mut h = harness(HarnessOptions::default());

    h.coordinator.submit_capture(capture()).await.unwrap();
    next_matching(&mut h.events, |e| matches!(e, SessionEvent::ShowResult(_))).await;

    h.coordinator.shutdown().await;

    assert_eq!(
        h.coordinator.submit_capture(capture()).await,
        Err(SessionError::ShutDown)
    );
    assert_eq!(
        h.coordinator.start_quick_feedback().await,
        Err(SessionError::ShutDown)
    );

    time::sleep(Duration::from_millis(10_000)).await;
    let mut saw_shutdown = false;
    while let Ok(event) = h.events.try_recv() {
        assert!(!matches!(event, SessionEvent::ClearResult));
        saw_shutdown |= matches!(event, SessionEvent::ShutDown);
    }
    assert!(saw_shutdown);
    assert_eq!(h.coordinator.analysis_count().await, 0);
}
