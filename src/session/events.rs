use serde::Serialize;

use crate::ensemble::AggregatedDecision;

use super::mode::AnalysisOutcome;
use super::state::{ResultKind, SessionState};

/// Bundled clip played for anything that is not a confident verdict.
pub const ERROR_AUDIO_ASSET: &str = "error.mp3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DirectiveKind {
    Success,
    Unclear,
    Error,
}

/// What the UI should play alongside a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum AudioCue {
    /// Spoken verdict served by the classification service.
    Remote { url: String },
    /// A clip shipped with the app, e.g. `FreshApple.mp3`.
    Bundled { asset: String },
}

/// One result screen. The UI shows it until the matching
/// [`SessionEvent::ClearResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayDirective {
    pub kind: DirectiveKind,
    pub duration_ms: u64,
    pub decision: Option<AggregatedDecision>,
    pub text: String,
    pub audio: AudioCue,
}

impl DisplayDirective {
    pub fn for_outcome(outcome: &AnalysisOutcome, duration_ms: u64) -> Self {
        match outcome {
            AnalysisOutcome::Success(verdict) => {
                let decision = &verdict.decision;
                let item = capitalize(&decision.item_type);
                let category = if decision.is_fresh { "Fresh" } else { "Rotten" };
                let audio = match &verdict.audio_url {
                    Some(url) => AudioCue::Remote { url: url.clone() },
                    None => AudioCue::Bundled {
                        asset: format!("{category}{}.mp3", item.replace(' ', "")),
                    },
                };
                Self {
                    kind: DirectiveKind::Success,
                    duration_ms,
                    decision: Some(decision.clone()),
                    text: format!("{category} {item}"),
                    audio,
                }
            }
            AnalysisOutcome::Rejected(_) => Self::notice(
                DirectiveKind::Unclear,
                duration_ms,
                "Could not tell, please try again",
            ),
            AnalysisOutcome::Failed(_) => Self::notice(
                DirectiveKind::Error,
                duration_ms,
                "Something went wrong, please try again",
            ),
        }
    }

    fn notice(kind: DirectiveKind, duration_ms: u64, text: &str) -> Self {
        Self {
            kind,
            duration_ms,
            decision: None,
            text: text.to_string(),
            audio: AudioCue::Bundled {
                asset: ERROR_AUDIO_ASSET.to_string(),
            },
        }
    }

    pub fn result_kind(&self) -> ResultKind {
        match self.kind {
            DirectiveKind::Success => ResultKind::Success,
            DirectiveKind::Unclear => ResultKind::Rejected,
            DirectiveKind::Error => ResultKind::Failed,
        }
    }
}

/// "apple" -> "Apple", "bell pepper" -> "Bell pepper".
fn capitalize(item: &str) -> String {
    let lowered = item.to_lowercase();
    let mut chars = lowered.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Everything the coordinator tells the host, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// A capture arrived while busy and was dropped.
    CaptureRejected(SessionState),
    ShowResult(DisplayDirective),
    ClearResult,
    /// Show the prompt; recording has begun.
    FeedbackPrompt,
    ShowThanks { duration_ms: u64 },
    ClearThanks,
    FeedbackDismissed,
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::Mode;
    use crate::ensemble::AggregationError;
    use crate::session::mode::{AnalysisFailure, RejectedLowConfidence, Verdict};

    fn verdict(label: &str, item: &str, is_fresh: bool, audio_url: Option<&str>) -> AnalysisOutcome {
        AnalysisOutcome::Success(Verdict {
            decision: AggregatedDecision {
                label: label.into(),
                item_type: item.into(),
                is_fresh,
                confidence: 0.9,
                votes_for_label: 3,
            },
            mode: if audio_url.is_some() { Mode::Online } else { Mode::Offline },
            audio_url: audio_url.map(str::to_string),
        })
    }

    #[test]
    fn offline_success_plays_the_bundled_clip() {
        let directive = DisplayDirective::for_outcome(&verdict("rotten_banana", "banana", false, None), 3_000);

        assert_eq!(directive.kind, DirectiveKind::Success);
        assert_eq!(directive.text, "Rotten Banana");
        assert_eq!(
            directive.audio,
            AudioCue::Bundled {
                asset: "RottenBanana.mp3".into()
            }
        );
        assert_eq!(directive.result_kind(), ResultKind::Success);
    }

    #[test]
    fn online_success_forwards_the_server_audio() {
        let directive = DisplayDirective::for_outcome(
            &verdict("Fresh Apple", "Apple", true, Some("http://host/a.mp3")),
            3_000,
        );
        assert_eq!(
            directive.audio,
            AudioCue::Remote {
                url: "http://host/a.mp3".into()
            }
        );
    }

    #[test]
    fn rejected_and_failed_share_the_error_clip_and_duration() {
        let rejected = DisplayDirective::for_outcome(
            &AnalysisOutcome::Rejected(RejectedLowConfidence {
                item_type: "Mango".into(),
                confidence: 0.4,
                threshold: 0.6,
            }),
            3_000,
        );
        let failed = DisplayDirective::for_outcome(
            &AnalysisOutcome::Failed(AnalysisFailure::Aggregation(AggregationError::NoVotes)),
            3_000,
        );

        assert_eq!(rejected.kind, DirectiveKind::Unclear);
        assert_eq!(failed.kind, DirectiveKind::Error);
        assert_eq!(rejected.audio, failed.audio);
        assert_eq!(rejected.duration_ms, failed.duration_ms);
        assert!(rejected.decision.is_none());
    }
}
