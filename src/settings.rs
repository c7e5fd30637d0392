use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf, sync::RwLock, time::Duration};
use uuid::Uuid;

use crate::ensemble::{EnsembleConfig, MAX_INPUT_EDGE};
use crate::imaging::VariantStrategy;

/// Per-item acceptance thresholds for a produced decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThresholdConfig {
    pub default_threshold: f32,
    /// Keyed by item type, compared case-insensitively.
    pub per_item: BTreeMap<String, f32>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.60,
            per_item: BTreeMap::new(),
        }
    }
}

impl ThresholdConfig {
    pub fn threshold_for(&self, item_type: &str) -> f32 {
        self.per_item
            .iter()
            .find(|(item, _)| item.eq_ignore_ascii_case(item_type))
            .map(|(_, threshold)| *threshold)
            .unwrap_or(self.default_threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionTimingConfig {
    /// Fixed time every result directive stays up.
    pub result_display_ms: u64,
    /// Completed analyses between feedback prompts.
    pub feedback_trigger_count: u32,
    pub settle_delay_ms: u64,
    /// Upper bound on one whole analysis, either path.
    pub analysis_timeout_ms: u64,
}

impl Default for SessionTimingConfig {
    fn default() -> Self {
        Self {
            result_display_ms: 3_000,
            feedback_trigger_count: 5,
            settle_delay_ms: 5_000,
            analysis_timeout_ms: 30_000,
        }
    }
}

impl SessionTimingConfig {
    pub fn result_display(&self) -> Duration {
        Duration::from_millis(self.result_display_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedbackConfig {
    pub recording_window_ms: u64,
    pub thanks_duration_ms: u64,
    pub upload_timeout_ms: u64,
    pub dispatch_timeout_ms: u64,
    pub fallback_recipient: String,
    pub fallback_package: String,
    pub fallback_caption: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            recording_window_ms: 7_000,
            thanks_duration_ms: 5_000,
            upload_timeout_ms: 20_000,
            dispatch_timeout_ms: 5_000,
            fallback_recipient: "marketmate-feedback".into(),
            fallback_package: "com.whatsapp".into(),
            fallback_caption: "Voice feedback on the app".into(),
        }
    }
}

impl FeedbackConfig {
    pub fn recording_window(&self) -> Duration {
        Duration::from_millis(self.recording_window_ms)
    }

    pub fn thanks_duration(&self) -> Duration {
        Duration::from_millis(self.thanks_duration_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

/// Where and how captures go on the online path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    /// Each edge is divided by this before upload.
    pub upload_downscale: u32,
    pub jpeg_quality: u8,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.1.3:8080/".into(),
            request_timeout_ms: 20_000,
            upload_downscale: 4,
            jpeg_quality: 70,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Everything tunable about the engine. Every field has a default, so an
/// empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub ensemble: EnsembleConfig,
    pub thresholds: ThresholdConfig,
    pub session: SessionTimingConfig,
    pub feedback: FeedbackConfig,
    pub remote: RemoteConfig,
    /// Sent with every upload. Filled in by [`SettingsStore`] on first load.
    pub device_id: String,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let ensemble = &self.ensemble;
        if !(0.0..=1.0).contains(&ensemble.confidence_floor) {
            bail!("confidence floor {} is outside [0, 1]", ensemble.confidence_floor);
        }
        if !(0.0..=1.0).contains(&ensemble.rotten_override_gate) {
            bail!("rotten override gate {} is outside [0, 1]", ensemble.rotten_override_gate);
        }
        if !(ensemble.rotten_boost > 0.0 && ensemble.rotten_boost.is_finite()) {
            bail!("rotten boost must be positive, got {}", ensemble.rotten_boost);
        }
        if ensemble.input_edge == 0 || ensemble.input_edge > MAX_INPUT_EDGE {
            bail!(
                "engine input edge {} is outside 1..={}",
                ensemble.input_edge,
                MAX_INPUT_EDGE
            );
        }
        if ensemble.variants.is_empty() {
            bail!("variant list is empty; it needs at least {}", VariantStrategy::Standard);
        }

        let thresholds = std::iter::once(&self.thresholds.default_threshold)
            .chain(self.thresholds.per_item.values());
        for threshold in thresholds {
            if !(0.0..=1.0).contains(threshold) {
                bail!("confidence threshold {} is outside [0, 1]", threshold);
            }
        }

        if self.session.feedback_trigger_count == 0 {
            bail!("feedback trigger count must be at least 1");
        }

        let durations = [
            ("variantTimeoutMs", ensemble.variant_timeout_ms),
            ("resultDisplayMs", self.session.result_display_ms),
            ("settleDelayMs", self.session.settle_delay_ms),
            ("analysisTimeoutMs", self.session.analysis_timeout_ms),
            ("recordingWindowMs", self.feedback.recording_window_ms),
            ("thanksDurationMs", self.feedback.thanks_duration_ms),
            ("uploadTimeoutMs", self.feedback.upload_timeout_ms),
            ("dispatchTimeoutMs", self.feedback.dispatch_timeout_ms),
            ("requestTimeoutMs", self.remote.request_timeout_ms),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, ms)| *ms == 0) {
            bail!("{} must be greater than zero", name);
        }

        if self.remote.upload_downscale == 0 {
            bail!("upload downscale must be at least 1");
        }
        if !(1..=100).contains(&self.remote.jpeg_quality) {
            bail!("JPEG quality {} is outside 1..=100", self.remote.jpeg_quality);
        }

        Ok(())
    }
}

/// JSON-file backed [`EngineConfig`].
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineConfig>,
}

impl SettingsStore {
    /// Load the file, or start from defaults when it does not exist. A config
    /// without a device id gets a fresh one, written back immediately.
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            EngineConfig::default()
        };
        data.validate()?;

        let store = Self {
            path,
            data: RwLock::new(EngineConfig::default()),
        };

        if data.device_id.trim().is_empty() {
            data.device_id = Uuid::new_v4().to_string();
            store.persist(&data)?;
        }

        *store.write_guard()? = data;
        Ok(store)
    }

    pub fn config(&self) -> Result<EngineConfig> {
        Ok(self.read_guard()?.clone())
    }

    pub fn device_id(&self) -> Result<String> {
        Ok(self.read_guard()?.device_id.clone())
    }

    /// Apply `change` to a copy, validate, persist, then swap it in.
    pub fn update<F>(&self, change: F) -> Result<EngineConfig>
    where
        F: FnOnce(&mut EngineConfig),
    {
        let mut guard = self.write_guard()?;
        let mut next = guard.clone();
        change(&mut next);
        next.validate()?;
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: EngineConfig = serde_json::from_str(&contents)?;
        data.validate()?;
        *self.write_guard()? = data;
        Ok(())
    }

    fn persist(&self, data: &EngineConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read_guard(&self) -> Result<std::sync::RwLockReadGuard<'_, EngineConfig>> {
        self.data
            .read()
            .map_err(|_| anyhow::anyhow!("settings lock poisoned"))
    }

    fn write_guard(&self) -> Result<std::sync::RwLockWriteGuard<'_, EngineConfig>> {
        self.data
            .write()
            .map_err(|_| anyhow::anyhow!("settings lock poisoned"))
    }
}
