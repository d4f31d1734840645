//! Candidate filter pipeline
//!
//! Five checks in fixed order; the first match excludes the candidate.
//! Survivors keep the order the planner established.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::models::MessageCandidate;

/// Apply the filter pipeline to planner output
///
/// `fetch_from` is the user's checkpoint: re-checked here even though the
/// search was already bounded by it, so a store returning stale results
/// cannot walk the checkpoint backwards.
pub fn filter_candidates(
    candidates: Vec<MessageCandidate>,
    drafts: &HashSet<String>,
    fetch_from: DateTime<Utc>,
    ignore_from: &HashSet<String>,
) -> Vec<MessageCandidate> {
    let total = candidates.len();
    let result: Vec<MessageCandidate> = candidates
        .into_iter()
        .filter(|c| admit(c, drafts, fetch_from, ignore_from))
        .collect();
    info!("filtered {} candidates down to {}", total, result.len());
    result
}

fn admit(
    candidate: &MessageCandidate,
    drafts: &HashSet<String>,
    fetch_from: DateTime<Utc>,
    ignore_from: &HashSet<String>,
) -> bool {
    if candidate
        .message_ids
        .iter()
        .any(|id| drafts.contains(id))
    {
        debug!("ignoring draft message {}", candidate.message_ref);
        return false;
    }

    let received = match candidate.received_date {
        Some(received) => received,
        None => {
            info!(
                "message {} has no received date, skipping",
                candidate.message_ref
            );
            return false;
        }
    };

    if received <= fetch_from {
        debug!(
            "message {} received {} not after checkpoint {}",
            candidate.message_ref, received, fetch_from
        );
        return false;
    }

    if candidate.from.is_empty() {
        info!(
            "ignoring message {} with empty from",
            candidate.message_ref
        );
        return false;
    }

    if ignore_from.contains(&candidate.primary_from().to_lowercase()) {
        debug!(
            "ignoring message {} from {}",
            candidate.message_ref,
            candidate.primary_from()
        );
        return false;
    }

    true
}
