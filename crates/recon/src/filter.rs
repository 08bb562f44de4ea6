//! Narrow a CRM export to the contacts that overlap a vendor batch.

use std::collections::HashSet;

use tracing::info;

use crate::model::{Contact, Population};
use crate::normalize::NameKey;

pub const SOURCE_VENDOR: &str = "IDI";
pub const SOURCE_CRM: &str = "Airtable";

/// Every vendor contact, followed by the CRM contacts that share a vendor
/// name or relate to a CRM contact that does. Each output contact is tagged
/// with `_source` and `_match_reason`.
pub fn filter_for_comparison(vendor: &[Contact], crm: &[Contact]) -> Vec<Contact> {
    let vendor_keys: HashSet<NameKey> = vendor
        .iter()
        .map(Contact::name_key)
        .filter(|k| !k.is_blank())
        .collect();
    let matches_vendor = |c: &Contact| {
        let key = c.name_key();
        !key.is_blank() && vendor_keys.contains(&key)
    };
    let crm_population = Population::new(crm);

    let mut out: Vec<Contact> = vendor
        .iter()
        .cloned()
        .map(|mut c| {
            c.source = Some(SOURCE_VENDOR.into());
            c.match_reason = Some("IDI source data".into());
            c
        })
        .collect();

    let mut direct = 0;
    let mut related = 0;
    for contact in crm {
        let reason = if matches_vendor(contact) {
            direct += 1;
            "Direct name match".to_string()
        } else {
            let names: Vec<String> = contact
                .relations
                .iter()
                .filter_map(|id| crm_population.get(*id))
                .filter(|r| matches_vendor(r))
                .map(Contact::display_name)
                .collect();
            if names.is_empty() {
                continue;
            }
            related += 1;
            format!("Related to IDI contacts: {}", names.join(", "))
        };

        let mut tagged = contact.clone();
        tagged.source = Some(SOURCE_CRM.into());
        tagged.match_reason = Some(reason);
        out.push(tagged);
    }

    info!(vendor = vendor.len(), direct, related, total = out.len(), "filtered contacts");
    out
}
