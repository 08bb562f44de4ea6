//! Household attributes inherited from the Owner (foreclosure links).

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MergePolicy;
use crate::matcher::find_existing;
use crate::model::{Contact, ContactId, FieldMap, Population};
use crate::repository::{ContactRepository, Record};

/// Resolves a contact's inherited foreclosures, memoized per owner.
#[derive(Debug, Default)]
pub struct ForeclosureResolver {
    by_owner: HashMap<ContactId, Vec<String>>,
}

impl ForeclosureResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Foreclosures `contact` should carry.
    ///
    /// An Owner takes those of its own CRM record (`existing`). Anyone else
    /// takes those of the first related Owner in `network` whose CRM record
    /// has any.
    pub fn resolve<R: ContactRepository + ?Sized>(
        &mut self,
        contact: &Contact,
        existing: Option<&Record>,
        network: &Population<'_>,
        repo: &mut R,
        policy: &MergePolicy,
    ) -> Vec<String> {
        if contact.is_owner() {
            let found = existing.map(Record::foreclosures).unwrap_or_default();
            self.by_owner.insert(contact.id, found.clone());
            return found;
        }

        for owner in contact
            .relations
            .iter()
            .filter_map(|id| network.get(*id))
            .filter(|c| c.is_owner())
        {
            let found = self.owner_foreclosures(owner, repo, policy);
            if !found.is_empty() {
                debug!(id = %contact.id, owner = %owner.id, count = found.len(), "inheriting foreclosures");
                return found;
            }
        }

        Vec::new()
    }

    fn owner_foreclosures<R: ContactRepository + ?Sized>(
        &mut self,
        owner: &Contact,
        repo: &mut R,
        policy: &MergePolicy,
    ) -> Vec<String> {
        if let Some(cached) = self.by_owner.get(&owner.id) {
            return cached.clone();
        }

        let found = match find_existing(owner, repo, policy) {
            Ok(record) => record.map(|r| r.foreclosures()).unwrap_or_default(),
            Err(e) => {
                warn!(owner = %owner.id, error = %e, "owner lookup failed, no foreclosures inherited");
                Vec::new()
            }
        };
        self.by_owner.insert(owner.id, found.clone());
        found
    }
}

/// Put `inherited` into `fields` when allowed: always for a new record, only
/// over an empty Foreclosures value for an existing one.
pub fn apply_foreclosures(fields: &mut FieldMap, inherited: &[String], existing: Option<&Record>) {
    if inherited.is_empty() {
        return;
    }
    if existing.is_some_and(|r| !r.foreclosures().is_empty()) {
        return;
    }
    fields.insert(
        "Foreclosures".to_string(),
        Value::Array(inherited.iter().cloned().map(Value::String).collect()),
    );
}
