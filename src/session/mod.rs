//! The capture session: path selection per capture, the result state
//! machine and the feedback cadence.

mod controller;
mod events;
mod mode;
mod state;

pub use controller::{EngineCollaborators, SessionCoordinator, SessionError};
pub use events::{AudioCue, DirectiveKind, DisplayDirective, SessionEvent, ERROR_AUDIO_ASSET};
pub use mode::{AnalysisFailure, AnalysisOutcome, ModeSelector, RejectedLowConfidence, Verdict};
pub use state::{AnalysisCounter, ResultKind, SessionState};
