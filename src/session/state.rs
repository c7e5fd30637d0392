use serde::Serialize;
use uuid::Uuid;

use crate::connectivity::Mode;
use crate::feedback::FeedbackControls;

/// Which result directive is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultKind {
    Success,
    Rejected,
    Failed,
}

/// Where the session is. Exactly one per coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "result", rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Capturing,
    Analyzing,
    ShowingResult(ResultKind),
    FeedbackPrompt,
}

/// Counts completed analyses and says when a feedback prompt is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisCounter {
    count: u32,
    trigger: u32,
}

impl AnalysisCounter {
    pub fn new(trigger: u32) -> Self {
        Self {
            count: 0,
            trigger: trigger.max(1),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Count one completed analysis. Returns true when the trigger is reached,
    /// in which case the counter is already back at zero.
    pub fn record_completed(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.trigger {
            self.count = 0;
            true
        } else {
            false
        }
    }
}

/// The feedback session currently allowed to run.
#[derive(Debug, Clone)]
pub(crate) struct ActiveFeedback {
    pub id: Uuid,
    pub controls: FeedbackControls,
}

impl ActiveFeedback {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            controls: FeedbackControls::new(),
        }
    }
}

/// All mutable session data, owned by the coordinator behind one lock.
#[derive(Debug)]
pub(crate) struct EngineContext {
    pub state: SessionState,
    pub counter: AnalysisCounter,
    pub last_mode: Option<Mode>,
    pub feedback: Option<ActiveFeedback>,
    pub shut_down: bool,
}

impl EngineContext {
    pub fn new(trigger: u32) -> Self {
        Self {
            state: SessionState::Idle,
            counter: AnalysisCounter::new(trigger),
            last_mode: None,
            feedback: None,
            shut_down: false,
        }
    }

    /// Captures and quick feedback both need a quiet session.
    pub fn is_available(&self) -> bool {
        self.state == SessionState::Idle && self.feedback.is_none()
    }

    pub fn owns_feedback(&self, id: Uuid) -> bool {
        self.feedback.as_ref().map(|active| active.id) == Some(id)
    }
}
