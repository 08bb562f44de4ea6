//! Collapse duplicate people inside a discovered network.
//!
//! Two entries with the same name key are the same person unless a suffix or
//! age signal says otherwise. When they collapse, one survivor is chosen:
//!
//! 1. a record whose role is "Owner" beats one that isn't
//! 2. otherwise the record with more populated fields wins
//! 3. ties keep the record seen first
//!
//! Every decision is returned as a [`DedupDecision`] and logged.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::info;

use crate::config::MergePolicy;
use crate::model::{Contact, ContactId, NetworkEntry};
use crate::normalize::NameKey;

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Why two same-named records were kept apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum DistinctReason {
    Suffix { first: String, second: String },
    Age { first: u32, second: u32 },
}

/// Why the survivor of a collapse won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SurvivorReason {
    Owner,
    MoreFields { survivor: usize, dropped: usize },
    EarliestSeen { fields: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DedupDecision {
    KeptBoth {
        name: String,
        first: ContactId,
        second: ContactId,
        reason: DistinctReason,
    },
    Collapsed {
        name: String,
        survivor: ContactId,
        dropped: ContactId,
        reason: SurvivorReason,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub survivors: Vec<NetworkEntry>,
    pub decisions: Vec<DedupDecision>,
    /// Dropped ID → surviving ID.
    pub aliases: BTreeMap<ContactId, ContactId>,
}

impl DedupOutcome {
    pub fn duplicates_removed(&self) -> usize {
        self.aliases.len()
    }
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

pub fn deduplicate(network: Vec<NetworkEntry>, policy: &MergePolicy) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    // Name key → index into `outcome.survivors` of the record holding that key.
    let mut by_key: HashMap<NameKey, usize> = HashMap::new();

    for entry in network {
        let key = entry.contact.name_key();
        if key.is_blank() {
            outcome.survivors.push(entry);
            continue;
        }

        let Some(&slot) = by_key.get(&key) else {
            by_key.insert(key, outcome.survivors.len());
            outcome.survivors.push(entry);
            continue;
        };

        let held = &outcome.survivors[slot].contact;
        let name = entry.contact.display_name();

        if let Some(reason) = distinct_reason(held, &entry.contact, policy.dedup_age_threshold) {
            let decision = DedupDecision::KeptBoth {
                name,
                first: held.id,
                second: entry.contact.id,
                reason,
            };
            info!(?decision, "kept both same-named records");
            outcome.decisions.push(decision);
            // The key keeps pointing at the earlier record.
            outcome.survivors.push(entry);
            continue;
        }

        let (replace, reason) = pick_survivor(held, &entry.contact);
        let (survivor, dropped) = if replace {
            (entry.contact.id, held.id)
        } else {
            (held.id, entry.contact.id)
        };

        let decision = DedupDecision::Collapsed {
            name,
            survivor,
            dropped,
            reason,
        };
        info!(?decision, "collapsed duplicate");
        outcome.decisions.push(decision);

        for target in outcome.aliases.values_mut() {
            if *target == dropped {
                *target = survivor;
            }
        }
        outcome.aliases.insert(dropped, survivor);

        if replace {
            outcome.survivors[slot] = entry;
        }
    }

    outcome
}

/// `Some` when the records are provably different people.
fn distinct_reason(a: &Contact, b: &Contact, age_threshold: u32) -> Option<DistinctReason> {
    if let (Some(sa), Some(sb)) = (a.suffix_text(), b.suffix_text()) {
        if !sa.eq_ignore_ascii_case(sb) {
            return Some(DistinctReason::Suffix {
                first: sa.to_string(),
                second: sb.to_string(),
            });
        }
    }

    if let (Some(aa), Some(ab)) = (a.known_age(), b.known_age()) {
        if aa.abs_diff(ab) > age_threshold {
            return Some(DistinctReason::Age {
                first: aa,
                second: ab,
            });
        }
    }

    None
}

/// Returns `(newcomer_wins, reason)`.
fn pick_survivor(held: &Contact, newcomer: &Contact) -> (bool, SurvivorReason) {
    match (held.is_owner(), newcomer.is_owner()) {
        (true, false) => return (false, SurvivorReason::Owner),
        (false, true) => return (true, SurvivorReason::Owner),
        _ => {}
    }

    let held_fields = held.populated_field_count();
    let new_fields = newcomer.populated_field_count();
    if new_fields > held_fields {
        (
            true,
            SurvivorReason::MoreFields {
                survivor: new_fields,
                dropped: held_fields,
            },
        )
    } else if held_fields > new_fields {
        (
            false,
            SurvivorReason::MoreFields {
                survivor: held_fields,
                dropped: new_fields,
            },
        )
    } else {
        (false, SurvivorReason::EarliestSeen { fields: held_fields })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
