//! Collaborators the feedback pipeline drives: the microphone, the primary
//! feedback endpoint and the message-app hand-off.

use chrono::Utc;
use serde::Deserialize;

use crate::wire::{HttpReply, MultipartFile, TransportFault, DEVICE_ID_FIELD};

use super::FeedbackError;

/// Multipart field carrying the recording.
pub const VOICE_MESSAGE_FIELD: &str = "voice_message";

/// A finished recording (AAC in an MP4 container on the reference host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
}

impl AudioClip {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Microphone access.
///
/// Calls must return promptly. `discard` must be safe to call at any time,
/// more than once, and whether or not a recording is running.
pub trait AudioRecorder: Send + Sync {
    fn start(&self) -> Result<(), FeedbackError>;
    fn stop(&self) -> Result<AudioClip, FeedbackError>;
    fn discard(&self);
}

/// Multipart body for `POST api/submit-feedback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackSubmission {
    pub device_id: String,
    pub voice_message: MultipartFile,
}

impl FeedbackSubmission {
    pub fn new(device_id: String, clip: AudioClip) -> Self {
        Self {
            device_id,
            voice_message: MultipartFile {
                field: VOICE_MESSAGE_FIELD,
                file_name: format!("feedback_{}.m4a", Utc::now().timestamp_millis()),
                content_type: "audio/mp4",
                bytes: clip.bytes,
            },
        }
    }

    /// Text part as `(field name, value)`.
    pub fn device_id_part(&self) -> (&'static str, &str) {
        (DEVICE_ID_FIELD, &self.device_id)
    }
}

/// Primary delivery channel. Blocking.
pub trait FeedbackService: Send + Sync {
    fn submit_feedback(&self, submission: &FeedbackSubmission) -> Result<HttpReply, TransportFault>;
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    pub feedback_id: Option<String>,
}

/// What the message-app hand-off is pre-filled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackHandoff {
    pub recipient: String,
    pub package: String,
    pub caption: String,
    pub attachment_type: &'static str,
    pub clip: AudioClip,
}

/// Secondary channel: an intent-style share to an external messaging app.
/// Only "dispatched" or "failed" matters; nothing is confirmed beyond that.
pub trait FallbackDispatcher: Send + Sync {
    fn dispatch(&self, handoff: &FallbackHandoff) -> Result<(), FeedbackError>;
}
