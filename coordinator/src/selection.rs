//! Relay selection and reassignment planning over registry snapshots.
//!
//! Nothing in here touches the store. The coordinator reads the hashes,
//! hands the snapshots to these functions and applies the result.
use crate::types::{RelayBinding, RelayRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub fn decode_record(raw: &str) -> Result<RelayRecord, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Picks the live relay with the lowest load. Ties go to the smallest relay id.
pub fn select_relay(
    registry: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> Option<RelayBinding> {
    select_from(registry.iter(), now)
}

fn select_from<'a, I>(entries: I, now: DateTime<Utc>) -> Option<RelayBinding>
where
    I: Iterator<Item = (&'a String, &'a String)>,
{
    let mut best: Option<(&str, RelayRecord)> = None;

    for (relay_id, raw) in entries {
        let record = match decode_record(raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(relay_id, error = %e, "skipping malformed relay record");
                continue;
            }
        };

        if !record.is_live(now) {
            tracing::debug!(
                relay_id,
                last_heartbeat = %record.last_heartbeat,
                "skipping stale relay"
            );
            continue;
        }

        let better = match &best {
            None => true,
            Some((best_id, best_record)) => {
                (record.load, relay_id.as_str()) < (best_record.load, *best_id)
            }
        };
        if better {
            best = Some((relay_id.as_str(), record));
        }
    }

    best.map(|(relay_id, record)| RelayBinding::from_record(relay_id, &record))
}

#[derive(Clone, Debug, PartialEq)]
pub enum Reassignment {
    Rebind(RelayBinding),
    Unassign,
}

/// Decides where every project bound to `dead_relay_id` goes next.
///
/// The dead relay is never a candidate, even if its record still looks live
/// in the snapshot. Results are ordered by project name.
pub fn plan_reassignment(
    registry: &HashMap<String, String>,
    assignments: &HashMap<String, String>,
    dead_relay_id: &str,
    now: DateTime<Utc>,
) -> Vec<(String, Reassignment)> {
    let mut affected: Vec<&String> = assignments
        .iter()
        .filter(|(_, relay_id)| relay_id.as_str() == dead_relay_id)
        .map(|(project, _)| project)
        .collect();

    if affected.is_empty() {
        return Vec::new();
    }
    affected.sort();

    let target = select_from(
        registry
            .iter()
            .filter(|(relay_id, _)| relay_id.as_str() != dead_relay_id),
        now,
    );

    let action = match target {
        Some(binding) => Reassignment::Rebind(binding),
        None => Reassignment::Unassign,
    };

    affected
        .into_iter()
        .map(|project| (project.clone(), action.clone()))
        .collect()
}
