use serde::Serialize;
use thiserror::Error;

use crate::inference::{parse_label, ClassificationVote, LabelInfo};

use super::config::EnsembleConfig;

/// The ensemble's single answer for one capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedDecision {
    pub label: String,
    pub item_type: String,
    pub is_fresh: bool,
    pub confidence: f32,
    pub votes_for_label: usize,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AggregationError {
    #[error("no votes to aggregate")]
    NoVotes,
}

/// Per-label running totals, kept in first-appearance order so ties resolve
/// the same way on every run.
struct LabelTally<'a> {
    label: &'a str,
    info: LabelInfo,
    votes: usize,
    adjusted_sum: f32,
}

impl LabelTally<'_> {
    fn mean(&self) -> f32 {
        self.adjusted_sum / self.votes as f32
    }
}

/// Fuse per-variant votes into one decision.
///
/// 1. Drop votes at or below `confidence_floor`.
/// 2. Boost rotten-category confidences by `rotten_boost`. Boosted values stay
///    uncapped while labels are compared; only the reported confidence is
///    capped at 1.0.
/// 3. Tally count and mean adjusted confidence per label.
/// 4. A rotten label with mean above `rotten_override_gate` wins; the best
///    such mean is taken.
/// 5. Otherwise most votes wins, ties to the higher mean.
/// 6. If the floor removed everything, the best raw vote stands.
pub fn aggregate(
    votes: &[ClassificationVote],
    config: &EnsembleConfig,
) -> Result<AggregatedDecision, AggregationError> {
    if votes.is_empty() {
        return Err(AggregationError::NoVotes);
    }

    let mut tallies: Vec<LabelTally<'_>> = Vec::new();

    for vote in votes.iter().filter(|v| v.raw_confidence > config.confidence_floor) {
        let info = parse_label(&vote.label);
        let adjusted = if info.is_rotten() {
            vote.raw_confidence * config.rotten_boost
        } else {
            vote.raw_confidence
        };

        match tallies.iter_mut().find(|t| t.label == vote.label) {
            Some(tally) => {
                tally.votes += 1;
                tally.adjusted_sum += adjusted;
            }
            None => tallies.push(LabelTally {
                label: &vote.label,
                info,
                votes: 1,
                adjusted_sum: adjusted,
            }),
        }
    }

    if tallies.is_empty() {
        return Ok(best_raw_vote(votes));
    }

    let rotten_override = tallies
        .iter()
        .filter(|t| t.info.is_rotten() && t.mean() > config.rotten_override_gate)
        .fold(None::<&LabelTally<'_>>, |best, t| match best {
            Some(b) if b.mean() >= t.mean() => Some(b),
            _ => Some(t),
        });

    let winner = match rotten_override {
        Some(tally) => tally,
        None => tallies
            .iter()
            .fold(None::<&LabelTally<'_>>, |best, t| match best {
                Some(b) if (b.votes, b.mean()) >= (t.votes, t.mean()) => Some(b),
                _ => Some(t),
            })
            .ok_or(AggregationError::NoVotes)?,
    };

    Ok(AggregatedDecision {
        label: winner.label.to_string(),
        item_type: winner.info.item_type.clone(),
        is_fresh: winner.info.is_fresh(),
        confidence: winner.mean().min(1.0),
        votes_for_label: winner.votes,
    })
}

/// Step 6: nothing cleared the floor, fall back to the strongest raw vote.
fn best_raw_vote(votes: &[ClassificationVote]) -> AggregatedDecision {
    let mut best = &votes[0];
    for vote in &votes[1..] {
        if vote.raw_confidence > best.raw_confidence {
            best = vote;
        }
    }

    let info = parse_label(&best.label);
    AggregatedDecision {
        label: best.label.clone(),
        item_type: info.item_type.clone(),
        is_fresh: info.is_fresh(),
        confidence: best.raw_confidence,
        votes_for_label: votes.iter().filter(|v| v.label == best.label).count(),
    }
}
