//! Second pass: rewrite relation links in external-ID space, symmetrically.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::model::{ContactId, ExternalId, FieldMap, NetworkEntry};
use crate::repository::ContactRepository;

/// Internal ID → external record, built during materialization.
///
/// One external ID per internal ID. Several internal IDs may share an
/// external ID (a dropped duplicate and its survivor).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IdMapping(BTreeMap<ContactId, ExternalId>);

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ContactId, external: ExternalId) {
        self.0.insert(id, external);
    }

    pub fn get(&self, id: ContactId) -> Option<&ExternalId> {
        self.0.get(&id)
    }

    /// Point `alias` at whatever `target` maps to. No-op when `target` is unmapped.
    pub fn alias(&mut self, alias: ContactId, target: ContactId) {
        if let Some(external) = self.0.get(&target).cloned() {
            self.0.insert(alias, external);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContactId, &ExternalId)> {
        self.0.iter()
    }
}

/// Full relation list to write on one external record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationUpdate {
    pub target: ExternalId,
    pub relations: Vec<ExternalId>,
}

/// Translate every mapped contact's relations to external IDs and add the
/// reverse edge of each link. Unmapped relation IDs are dropped; self links
/// (after translation) are dropped. One update per external record, in order
/// of first appearance.
pub fn plan_relation_updates(network: &[NetworkEntry], mapping: &IdMapping) -> Vec<RelationUpdate> {
    let mut order: Vec<ExternalId> = Vec::new();
    let mut links: BTreeMap<ExternalId, Vec<ExternalId>> = BTreeMap::new();

    let mut link = |from: &ExternalId, to: &ExternalId| {
        if from == to {
            return;
        }
        let list = links.entry(from.clone()).or_insert_with(|| {
            order.push(from.clone());
            Vec::new()
        });
        if !list.contains(to) {
            list.push(to.clone());
        }
    };

    for entry in network {
        let Some(from) = mapping.get(entry.contact.id) else {
            continue;
        };
        for rel in &entry.contact.relations {
            match mapping.get(*rel) {
                Some(to) => {
                    link(from, to);
                    link(to, from);
                }
                None => debug!(from = %entry.contact.id, to = %rel, "relation has no external record"),
            }
        }
    }

    order
        .into_iter()
        .filter_map(|target| {
            links
                .remove(&target)
                .map(|relations| RelationUpdate { target, relations })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationStats {
    pub updated: usize,
    pub failed: usize,
}

/// Issue every planned relation update. Failures are logged and counted.
pub fn propagate_relations<R: ContactRepository + ?Sized>(
    network: &[NetworkEntry],
    mapping: &IdMapping,
    repo: &mut R,
) -> PropagationStats {
    let mut stats = PropagationStats::default();

    for update in plan_relation_updates(network, mapping) {
        let mut fields = FieldMap::new();
        fields.insert(
            "Relations".into(),
            Value::Array(
                update
                    .relations
                    .iter()
                    .map(|id| Value::String(id.0.clone()))
                    .collect(),
            ),
        );
        match repo.update(&update.target, fields) {
            Ok(()) => {
                debug!(target = %update.target, links = update.relations.len(), "relations written");
                stats.updated += 1;
            }
            Err(e) => {
                warn!(target = %update.target, error = %e, "relation update failed");
                stats.failed += 1;
            }
        }
    }

    info!(updated = stats.updated, failed = stats.failed, "relation pass finished");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Contact;

    fn entry(id: u64, relations: &[u64]) -> NetworkEntry {
        NetworkEntry {
            contact: Contact {
                id: ContactId(id),
                relations: relations.iter().copied().map(ContactId).collect(),
                ..Default::default()
            },
            depth: 0,
        }
    }

    fn ext(id: &str) -> ExternalId {
        ExternalId::new(id)
    }

    #[test]
    fn one_sided_link_becomes_symmetric() {
        let mut mapping = IdMapping::new();
        mapping.insert(ContactId(1), ext("extA"));
        mapping.insert(ContactId(2), ext("extB"));
        let network = vec![entry(1, &[2]), entry(2, &[])];

        let plan = plan_relation_updates(&network, &mapping);
        assert_eq!(
            plan,
            vec![
                RelationUpdate { target: ext("extA"), relations: vec![ext("extB")] },
                RelationUpdate { target: ext("extB"), relations: vec![ext("extA")] },
            ]
        );
    }

    #[test]
    fn unmapped_and_self_links_are_dropped() {
        let mut mapping = IdMapping::new();
        mapping.insert(ContactId(1), ext("extA"));
        mapping.insert(ContactId(2), ext("extB"));
        // 3 is a dropped duplicate of 1.
        mapping.alias(ContactId(3), ContactId(1));
        mapping.alias(ContactId(5), ContactId(99));
        let network = vec![entry(1, &[2, 3, 4]), entry(2, &[1, 3])];

        let plan = plan_relation_updates(&network, &mapping);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].relations, vec![ext("extB")]);
        assert_eq!(plan[1].relations, vec![ext("extA")]);
        assert!(mapping.get(ContactId(5)).is_none());
    }
}
