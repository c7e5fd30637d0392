//! MarketMate freshness decision engine.
//!
//! Turns a captured photo of produce into a fresh/rotten verdict, through the
//! classification service when online or a local multi-variant ensemble when
//! not, and runs the session around it: fixed-length result displays and a
//! periodic voice-feedback prompt. The host supplies the camera, model
//! runtime, transports and UI, and listens for [`SessionEvent`]s.

pub mod connectivity;
pub mod ensemble;
pub mod feedback;
pub mod imaging;
pub mod inference;
pub mod session;
pub mod settings;
pub mod wire;
mod utils;

pub use connectivity::{ConnectivityProbe, Mode};
pub use ensemble::{AggregatedDecision, EnsembleConfig};
pub use feedback::{AudioRecorder, FallbackDispatcher, FeedbackChannels, FeedbackService};
pub use imaging::CapturedImage;
pub use inference::{ClassificationService, InferenceEngine, LogitModel, OnDeviceEngine};
pub use session::{EngineCollaborators, SessionCoordinator, SessionError, SessionEvent, SessionState};
pub use settings::{EngineConfig, SettingsStore};

/// Install the global logger. Reads `RUST_LOG`, defaulting to info.
/// Later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();

    log::info!("MarketMate engine starting up...");
}
