use std::{sync::Arc, time::Duration};

use chrono::Utc;
use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;

use crate::imaging::{encode_upload_jpeg, CapturedImage, ImageVariant};
use crate::settings::RemoteConfig;
use crate::wire::{resolve_url, HttpReply, MultipartFile, TransportFault, DEVICE_ID_FIELD};

use super::{parse_label, ClassificationVote, InferenceEngine, InferenceError, LabelCategory, LabelInfo};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Multipart body for `POST api/upload-image`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationUpload {
    pub device_id: String,
    pub image: MultipartFile,
}

impl ClassificationUpload {
    /// Text part as `(field name, value)`.
    pub fn device_id_part(&self) -> (&'static str, &str) {
        (DEVICE_ID_FIELD, &self.device_id)
    }
}

/// Transport for the remote classification endpoint.
pub trait ClassificationService: Send + Sync {
    fn upload_image(&self, upload: &ClassificationUpload) -> Result<HttpReply, TransportFault>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    prediction: String,
    #[serde(default)]
    audio_file: Option<String>,
}

/// The server's verdict, already checked to name a fresh/rotten category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePrediction {
    pub prediction: String,
    pub label: LabelInfo,
    /// Spoken verdict for the UI; resolved against the service base URL.
    pub audio_url: Option<String>,
}

/// Anything that keeps the online path from producing a verdict.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("classification service answered HTTP {0}")]
    Status(u16),
    #[error("could not parse service response: {0}")]
    Parse(String),
    #[error("prediction {0:?} names neither fresh nor rotten")]
    UnrecognizedPrediction(String),
    #[error(transparent)]
    Transport(#[from] TransportFault),
    #[error("could not encode capture for upload: {0}")]
    Encode(String),
    #[error("request exceeded {0}ms")]
    TimedOut(u64),
    #[error("request worker failed: {0}")]
    Worker(String),
}

/// Remote adapter over a [`ClassificationService`].
#[derive(Clone)]
pub struct RemoteEngine {
    service: Arc<dyn ClassificationService>,
    config: RemoteConfig,
    device_id: String,
}

impl RemoteEngine {
    pub fn new(service: Arc<dyn ClassificationService>, config: RemoteConfig, device_id: String) -> Self {
        Self {
            service,
            config,
            device_id,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout()
    }

    /// Upload the full capture (downscaled) and interpret the verdict.
    /// Blocking: run it on a blocking worker.
    pub fn classify_capture(&self, image: &CapturedImage) -> Result<RemotePrediction, RemoteError> {
        self.upload(image.pixels(), self.config.upload_downscale)
    }

    fn upload(&self, pixels: &RgbImage, downscale: u32) -> Result<RemotePrediction, RemoteError> {
        let bytes = encode_upload_jpeg(pixels, downscale, self.config.jpeg_quality)
            .map_err(|err| RemoteError::Encode(err.to_string()))?;

        let upload = ClassificationUpload {
            device_id: self.device_id.clone(),
            image: MultipartFile {
                field: "image",
                file_name: format!("captured_image_{}.jpg", Utc::now().timestamp_millis()),
                content_type: "image/jpeg",
                bytes,
            },
        };

        log_info!(
            "uploading {} ({} bytes) for classification",
            upload.image.file_name,
            upload.image.bytes.len()
        );

        let reply = self.service.upload_image(&upload)?;
        interpret_reply(&reply, &self.config.base_url)
    }
}

impl InferenceEngine for RemoteEngine {
    /// The service returns a bare verdict, so the vote is fully confident.
    fn classify(&self, variant: &ImageVariant) -> Result<ClassificationVote, InferenceError> {
        let verdict = self.upload(variant.pixels(), 1)?;
        Ok(ClassificationVote::new(verdict.prediction, 1.0))
    }
}

fn interpret_reply(reply: &HttpReply, base_url: &str) -> Result<RemotePrediction, RemoteError> {
    if !reply.is_success() {
        log_warn!("classification service returned {}", reply.status);
        return Err(RemoteError::Status(reply.status));
    }

    let body: UploadResponse =
        serde_json::from_slice(&reply.body).map_err(|err| RemoteError::Parse(err.to_string()))?;

    let label = parse_label(&body.prediction);
    if label.category == LabelCategory::Unknown {
        log_warn!("unexpected prediction '{}'", body.prediction);
        return Err(RemoteError::UnrecognizedPrediction(body.prediction));
    }

    let audio_url = body
        .audio_file
        .filter(|reference| !reference.trim().is_empty())
        .map(|reference| resolve_url(base_url, &reference));

    Ok(RemotePrediction {
        prediction: body.prediction,
        label,
        audio_url,
    })
}
