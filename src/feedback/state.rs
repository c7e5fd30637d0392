use serde::Serialize;

/// Feedback session lifecycle.
///
/// ```text
/// Idle -> Recording -> Submitting -> Delivered
///                          |
///                          +-------> FallbackSent | FallbackFailed
/// ```
///
/// The terminal states hold until the thanks acknowledgment is cleared,
/// then the session returns to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackState {
    #[default]
    Idle,
    Recording,
    Submitting,
    Delivered,
    FallbackSent,
    FallbackFailed,
}

/// How one feedback session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// Primary channel accepted the clip.
    Delivered { feedback_id: Option<String> },
    /// Primary skipped or failed; the hand-off was dispatched.
    FallbackSent,
    /// Both channels failed. Logged only.
    FallbackFailed,
    /// Nothing was submitted: cancelled, recorder failure, or empty clip.
    Discarded,
}

impl FeedbackOutcome {
    /// The thanks acknowledgment follows every submission attempt, whatever
    /// its result.
    pub fn warrants_thanks(&self) -> bool {
        !matches!(self, FeedbackOutcome::Discarded)
    }

    pub fn final_state(&self) -> FeedbackState {
        match self {
            FeedbackOutcome::Delivered { .. } => FeedbackState::Delivered,
            FeedbackOutcome::FallbackSent => FeedbackState::FallbackSent,
            FeedbackOutcome::FallbackFailed => FeedbackState::FallbackFailed,
            FeedbackOutcome::Discarded => FeedbackState::Idle,
        }
    }
}
