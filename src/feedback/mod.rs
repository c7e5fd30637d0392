//! Voice feedback: a bounded recording, delivered through the feedback
//! endpoint when online, otherwise (or on any failure) handed off once to a
//! messaging app.

mod channels;
mod pipeline;
mod state;

pub use channels::{
    AudioClip, AudioRecorder, FallbackDispatcher, FallbackHandoff, FeedbackService,
    FeedbackSubmission, VOICE_MESSAGE_FIELD,
};
pub use pipeline::{FeedbackChannels, FeedbackControls, FeedbackPipeline};
pub use state::{FeedbackOutcome, FeedbackState};

use thiserror::Error;

use crate::wire::TransportFault;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("recorder failed: {0}")]
    Recorder(String),
    #[error("device is offline")]
    Offline,
    #[error("feedback endpoint answered HTTP {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] TransportFault),
    #[error("hand-off failed: {0}")]
    Dispatch(String),
    #[error("{stage} exceeded {timeout_ms}ms")]
    TimedOut { stage: &'static str, timeout_ms: u64 },
    #[error("feedback worker failed: {0}")]
    Worker(String),
}
