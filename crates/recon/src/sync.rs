//! Two-pass sync of a contact batch into the CRM.
//!
//! Pass 1 materializes every surviving network contact (match or create,
//! merge, foreclosures, properties) and builds the internal → external
//! mapping. Pass 2 writes relation links once every contact has one.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::MergePolicy;
use crate::dedup::{deduplicate, DedupDecision};
use crate::household::{apply_foreclosures, ForeclosureResolver};
use crate::matcher::find_existing;
use crate::merge::{changed_fields, contact_fields, merge_fields, prepare_new_fields};
use crate::model::{Contact, ContactId, ExternalId, FieldMap, NetworkEntry, Population};
use crate::network::discover;
use crate::propagate::{propagate_relations, IdMapping};
use crate::property::materialize_properties;
use crate::repository::ContactRepository;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Created { external_id: ExternalId },
    Updated { external_id: ExternalId },
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactOutcome {
    pub id: ContactId,
    pub name: String,
    pub depth: usize,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub discovered: usize,
    pub depth_breakdown: BTreeMap<usize, usize>,
    pub duplicates_removed: usize,
    pub decisions: Vec<DedupDecision>,
    pub outcomes: Vec<ContactOutcome>,
    pub properties_created: usize,
    pub relation_updates: usize,
    pub relation_failures: usize,
    pub mapping: IdMapping,
}

impl SyncReport {
    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Created { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Updated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0 || self.relation_failures > 0
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub struct SyncRun<'r, R: ContactRepository + ?Sized> {
    repo: &'r mut R,
    policy: &'r MergePolicy,
    foreclosures: ForeclosureResolver,
}

impl<'r, R: ContactRepository + ?Sized> SyncRun<'r, R> {
    pub fn new(repo: &'r mut R, policy: &'r MergePolicy) -> Self {
        Self {
            repo,
            policy,
            foreclosures: ForeclosureResolver::new(),
        }
    }

    /// Sync the network reachable from `seeds`. An empty seed list makes
    /// every contact a seed.
    pub fn execute(mut self, contacts: &[Contact], seeds: &[ContactId]) -> SyncReport {
        let population = Population::new(contacts);
        let seed_contacts: Vec<&Contact> = if seeds.is_empty() {
            contacts.iter().collect()
        } else {
            seeds
                .iter()
                .filter_map(|id| {
                    let found = population.get(*id);
                    if found.is_none() {
                        warn!(id = %id, "seed not found in contacts");
                    }
                    found
                })
                .collect()
        };

        let network = discover(&seed_contacts, &population, self.policy.max_depth);
        let mut report = SyncReport {
            discovered: network.len(),
            ..SyncReport::default()
        };
        for entry in &network {
            *report.depth_breakdown.entry(entry.depth).or_default() += 1;
        }

        let relations_by_id: HashMap<ContactId, Vec<ContactId>> = network
            .iter()
            .map(|e| (e.contact.id, e.contact.relations.clone()))
            .collect();

        let dedup = deduplicate(network, self.policy);
        report.duplicates_removed = dedup.duplicates_removed();
        report.decisions = dedup.decisions;
        let survivors = redirect_relations(dedup.survivors, &dedup.aliases, &relations_by_id);
        info!(
            discovered = report.discovered,
            survivors = survivors.len(),
            duplicates = report.duplicates_removed,
            "network ready"
        );

        // Pass 1
        let household = Population::new(survivors.iter().map(|e| &e.contact));
        let mut mapping = IdMapping::new();
        for entry in &survivors {
            let status = self.materialize(entry, &household, &mut mapping, &mut report);
            report.outcomes.push(ContactOutcome {
                id: entry.contact.id,
                name: entry.contact.display_name(),
                depth: entry.depth,
                status,
            });
        }

        for (dropped, survivor) in &dedup.aliases {
            mapping.alias(*dropped, *survivor);
        }

        // Pass 2
        let stats = propagate_relations(&survivors, &mapping, &mut *self.repo);
        report.relation_updates = stats.updated;
        report.relation_failures = stats.failed;
        report.mapping = mapping;

        info!(
            created = report.created(),
            updated = report.updated(),
            skipped = report.skipped(),
            failed = report.failed(),
            properties = report.properties_created,
            "sync finished"
        );
        report
    }

    fn materialize(
        &mut self,
        entry: &NetworkEntry,
        household: &Population<'_>,
        mapping: &mut IdMapping,
        report: &mut SyncReport,
    ) -> OutcomeStatus {
        let contact = &entry.contact;
        if !contact.has_name() {
            warn!(id = %contact.id, "contact has no name, skipping");
            return OutcomeStatus::Skipped {
                reason: "missing first and last name".into(),
            };
        }

        let existing = match find_existing(contact, self.repo, self.policy) {
            Ok(existing) => existing,
            Err(e) => {
                warn!(id = %contact.id, error = %e, "lookup failed");
                return OutcomeStatus::Failed {
                    reason: format!("lookup failed: {e}"),
                };
            }
        };

        let inherited =
            self.foreclosures
                .resolve(contact, existing.as_ref(), household, self.repo, self.policy);
        let new_fields = contact_fields(contact);
        let mut fields = self.policy.stamps.clone();

        let (external_id, status) = match existing {
            Some(record) => {
                let merged = merge_fields(&new_fields, &record.fields);
                fields.extend(changed_fields(&merged, &record.fields));
                apply_foreclosures(&mut fields, &inherited, Some(&record));
                if let Err(e) = self.repo.update(&record.id, fields) {
                    warn!(id = %contact.id, record = %record.id, error = %e, "update failed");
                    return OutcomeStatus::Failed {
                        reason: format!("update failed: {e}"),
                    };
                }
                info!(id = %contact.id, record = %record.id, name = %contact.display_name(), "updated existing contact");
                let status = OutcomeStatus::Updated {
                    external_id: record.id.clone(),
                };
                (record.id, status)
            }
            None => {
                fields.extend(prepare_new_fields(&new_fields));
                apply_foreclosures(&mut fields, &inherited, None);
                let id = match self.repo.create(fields) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(id = %contact.id, error = %e, "create failed");
                        return OutcomeStatus::Failed {
                            reason: format!("create failed: {e}"),
                        };
                    }
                };
                info!(id = %contact.id, record = %id, name = %contact.display_name(), "created contact");
                let status = OutcomeStatus::Created {
                    external_id: id.clone(),
                };
                (id, status)
            }
        };

        mapping.insert(contact.id, external_id.clone());
        report.properties_created += self.attach_properties(contact, &external_id);
        status
    }

    /// Create the contact's properties and link them. Returns how many were created.
    fn attach_properties(&mut self, contact: &Contact, external_id: &ExternalId) -> usize {
        if contact.addresses.is_empty() {
            return 0;
        }
        let created = materialize_properties(&contact.addresses, external_id, self.repo, self.policy);
        if created.is_empty() {
            return 0;
        }

        let mut link = FieldMap::new();
        link.insert(
            "Contact Addresses".into(),
            Value::Array(created.iter().map(|id| Value::String(id.0.clone())).collect()),
        );
        if let Err(e) = self.repo.update(external_id, link) {
            warn!(id = %contact.id, record = %external_id, error = %e, "linking properties failed");
        }
        created.len()
    }
}

/// Fold the relations of dropped duplicates into their survivors and point
/// every relation at a surviving ID. Self links are removed.
fn redirect_relations(
    mut survivors: Vec<NetworkEntry>,
    aliases: &BTreeMap<ContactId, ContactId>,
    relations_by_id: &HashMap<ContactId, Vec<ContactId>>,
) -> Vec<NetworkEntry> {
    let resolve = |id: ContactId| aliases.get(&id).copied().unwrap_or(id);

    for entry in &mut survivors {
        let own = entry.contact.id;
        let folded = aliases
            .iter()
            .filter(|(_, survivor)| **survivor == own)
            .filter_map(|(dropped, _)| relations_by_id.get(dropped))
            .flatten()
            .copied();

        let mut relations: Vec<ContactId> = Vec::new();
        for rel in entry.contact.relations.iter().copied().chain(folded) {
            let rel = resolve(rel);
            if rel != own && !relations.contains(&rel) {
                relations.push(rel);
            }
        }
        entry.contact.relations = relations;
    }

    survivors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_folds_dropped_relations() {
        let survivor = NetworkEntry {
            contact: Contact {
                id: ContactId(1),
                relations: vec![ContactId(3)],
                ..Default::default()
            },
            depth: 0,
        };
        let aliases = BTreeMap::from([(ContactId(2), ContactId(1))]);
        let relations_by_id = HashMap::from([
            (ContactId(1), vec![ContactId(3)]),
            (ContactId(2), vec![ContactId(1), ContactId(4), ContactId(3)]),
        ]);
        let out = redirect_relations(vec![survivor], &aliases, &relations_by_id);
        assert_eq!(out[0].contact.relations, vec![ContactId(3), ContactId(4)]);
    }
}
