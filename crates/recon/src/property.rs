//! Address sub-records → CRM property records.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MergePolicy;
use crate::format::{format_text, FieldClass};
use crate::model::{Address, ExternalId, FieldMap};
use crate::repository::ContactRepository;

/// Property fields copied from an address, with their formatting.
/// `None` means verbatim.
const PROPERTY_FIELDS: &[(&str, Option<FieldClass>)] = &[
    ("Street 1", Some(FieldClass::Address)),
    ("Street Number", None),
    ("Street Name", Some(FieldClass::Address)),
    ("Street Suffix", Some(FieldClass::Upper)),
    ("City", Some(FieldClass::General)),
    ("State", Some(FieldClass::Upper)),
    ("Zip Code", None),
    ("County", Some(FieldClass::General)),
    ("Property Type", Some(FieldClass::General)),
];

/// Pass-through attributes copied as-is when present.
const PASS_THROUGH: &[&str] = &[
    "Address",
    "Country",
    "First Seen",
    "Last Seen",
    "Assessed Value",
    "Market Value",
    "Purchase Date",
    "Purchase Amount",
    "Square Feet",
    "Lot Size",
    "Parcel ID",
];

/// Fields the property pass always writes itself: the record type, the owner
/// link added by the repository, and every formatted address field.
pub fn is_property_owned(field: &str) -> bool {
    field == "Type" || field == "Contacts" || PROPERTY_FIELDS.iter().any(|(name, _)| *name == field)
}

/// Property record fields for one address.
pub fn property_fields(address: &Address, policy: &MergePolicy) -> FieldMap {
    let mut fields = policy.property_stamps.clone();
    fields.insert("Type".into(), Value::String("Contact".into()));

    for &(field, class) in PROPERTY_FIELDS {
        if let Some(text) = address.text(field) {
            let value = match class {
                Some(class) => format_text(text, class),
                None => text.to_string(),
            };
            fields.insert(field.into(), Value::String(value));
        }
    }

    for &field in PASS_THROUGH {
        if let Some(value) = address.0.get(field).filter(|v| !v.is_null()) {
            fields.entry(field).or_insert_with(|| value.clone());
        }
    }

    fields
}

/// Create one property per address, owned by `owner`. Failures are logged
/// and skipped; the IDs of the created properties are returned.
pub fn materialize_properties<R: ContactRepository + ?Sized>(
    addresses: &[Address],
    owner: &ExternalId,
    repo: &mut R,
    policy: &MergePolicy,
) -> Vec<ExternalId> {
    let mut created = Vec::with_capacity(addresses.len());
    for (index, address) in addresses.iter().enumerate() {
        match repo.create_property(property_fields(address, policy), owner) {
            Ok(id) => {
                debug!(%owner, property = %id, "property created");
                created.push(id);
            }
            Err(e) => warn!(%owner, index, error = %e, "property creation failed, skipping"),
        }
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MemoryRepository, WriteOp};
    use serde_json::json;

    fn address(v: Value) -> Address {
        match v {
            Value::Object(m) => Address(m),
            _ => unreachable!(),
        }
    }

    #[test]
    fn formats_each_field_class() {
        let a = address(json!({
            "Street 1": "123 MAIN ST NW",
            "Street Number": "123",
            "Street Name": "MAIN",
            "Street Suffix": "st",
            "City": "MACON",
            "State": "ga",
            "Zip Code": "31201",
            "County": "BIBB",
            "Market Value": 150000,
            "Parcel ID": "P-17",
            "Unmapped": "x"
        }));
        let fields = property_fields(&a, &MergePolicy::default());
        assert_eq!(fields["IDI"], json!(true));
        assert_eq!(fields["Type"], json!("Contact"));
        assert_eq!(fields["Street 1"], json!("123 Main ST NW"));
        assert_eq!(fields["Street Name"], json!("Main"));
        assert_eq!(fields["Street Suffix"], json!("ST"));
        assert_eq!(fields["City"], json!("Macon"));
        assert_eq!(fields["State"], json!("GA"));
        assert_eq!(fields["Zip Code"], json!("31201"));
        assert_eq!(fields["County"], json!("Bibb"));
        assert_eq!(fields["Market Value"], json!(150000));
        assert_eq!(fields["Parcel ID"], json!("P-17"));
        assert!(!fields.contains_key("Unmapped"));
    }

    #[test]
    fn creates_one_property_per_address() {
        let mut repo = MemoryRepository::new();
        let owner = ExternalId::new("recW");
        let addresses = vec![
            address(json!({"City": "Macon"})),
            address(json!({"City": "Perry"})),
        ];
        let ids = materialize_properties(&addresses, &owner, &mut repo, &MergePolicy::default());
        assert_eq!(ids.len(), 2);
        assert!(repo
            .writes()
            .iter()
            .all(|w| matches!(w, WriteOp::Property { owner: o, .. } if o == &owner)));
    }
}
