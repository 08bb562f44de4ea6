use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MergeError;
use crate::normalize::{normalize, NameKey};

/// Field name → value mapping as the CRM store sees a record.
pub type FieldMap = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Batch-scoped integer identifier. Only unique within one processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub u64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier assigned by the CRM store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(pub String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Address / property sub-record. Opaque to matching and merging; forwarded to
/// the store's property table as-is (after formatting).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub FieldMap);

impl Address {
    /// Trimmed, non-empty string value of `field`.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A person record from either dataset.
///
/// Typed fields cover everything the engine reasons about; every other column
/// of the source record is kept in `extra` so nothing is lost when the record
/// is written back out or its populated fields are counted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "ID", default)]
    pub id: ContactId,

    #[serde(rename = "First Name", default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "Middle Name", default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(rename = "Last Name", default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(rename = "Suffix", default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    #[serde(
        rename = "Age",
        default,
        deserialize_with = "lenient_age",
        skip_serializing_if = "Option::is_none"
    )]
    pub age: Option<u32>,
    #[serde(rename = "Sex", default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(rename = "Deceased", default, skip_serializing_if = "Option::is_none")]
    pub deceased: Option<bool>,
    #[serde(rename = "Bankruptcy", default, skip_serializing_if = "Option::is_none")]
    pub bankruptcy: Option<bool>,

    #[serde(rename = "Phone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "Email", default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(rename = "Relations", default, deserialize_with = "null_as_empty")]
    pub relations: Vec<ContactId>,
    #[serde(rename = "Relation to Owner", default, skip_serializing_if = "Option::is_none")]
    pub relation_to_owner: Option<String>,

    #[serde(rename = "Contact Addresses", default, deserialize_with = "null_as_empty")]
    pub addresses: Vec<Address>,
    #[serde(rename = "Foreclosures", default, deserialize_with = "null_as_empty")]
    pub foreclosures: Vec<String>,

    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "_match_reason", default, skip_serializing_if = "Option::is_none")]
    pub match_reason: Option<String>,

    #[serde(flatten)]
    pub extra: FieldMap,
}

impl Contact {
    pub fn name_key(&self) -> NameKey {
        normalize(
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or(""),
        )
    }

    /// "First Last", trimmed. Used for log lines and reports.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        format!("{first} {last}").trim().to_string()
    }

    /// True when at least one of first/last name is non-blank.
    pub fn has_name(&self) -> bool {
        !self.name_key().is_blank()
    }

    pub fn is_owner(&self) -> bool {
        self.relation_to_owner
            .as_deref()
            .is_some_and(|r| r.trim().eq_ignore_ascii_case("owner"))
    }

    /// Age usable for disambiguation. Zero is treated as unknown.
    pub fn known_age(&self) -> Option<u32> {
        self.age.filter(|a| *a > 0)
    }

    /// Trimmed, non-empty suffix.
    pub fn suffix_text(&self) -> Option<&str> {
        self.suffix.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn is_traced(&self) -> bool {
        self.extra.get("Traced").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Number of populated fields across the record's full field set.
    ///
    /// A field is populated when present, not null, not a blank string and not
    /// an empty list. Records from different schemas stay comparable by count.
    pub fn populated_field_count(&self) -> usize {
        let text = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

        let typed = [
            true, // ID
            text(&self.first_name),
            text(&self.middle_name),
            text(&self.last_name),
            text(&self.suffix),
            self.age.is_some(),
            text(&self.sex),
            self.deceased.is_some(),
            self.bankruptcy.is_some(),
            text(&self.phone),
            text(&self.email),
            !self.relations.is_empty(),
            text(&self.relation_to_owner),
            !self.addresses.is_empty(),
            !self.foreclosures.is_empty(),
            text(&self.source),
            text(&self.match_reason),
        ];

        typed.iter().filter(|p| **p).count()
            + self.extra.values().filter(|v| is_populated(v)).count()
    }

    /// Value of a CRM field by its store name, typed fields first, then `extra`.
    pub fn field_value(&self, field: &str) -> Option<Value> {
        let text = |v: &Option<String>| v.clone().map(Value::String);
        match field {
            "First Name" => text(&self.first_name),
            "Middle Name" => text(&self.middle_name),
            "Last Name" => text(&self.last_name),
            "Suffix" => text(&self.suffix),
            "Age" => self.age.map(Value::from),
            "Sex" => text(&self.sex),
            "Deceased" => self.deceased.map(Value::Bool),
            "Bankruptcy" => self.bankruptcy.map(Value::Bool),
            "Phone" => text(&self.phone),
            "Email" => text(&self.email),
            "Relation to Owner" => text(&self.relation_to_owner),
            other => self.extra.get(other).filter(|v| !v.is_null()).cloned(),
        }
    }
}

/// Present, not null, not a blank string, not an empty list.
pub fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ages arrive as integers, floats (CRM number fields) or numeric strings.
fn lenient_age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| age_from_value(&v)))
}

/// Interpret a JSON value as a non-negative age.
pub fn age_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|a| u32::try_from(a).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Population lookup
// ---------------------------------------------------------------------------

/// Internal ID → contact lookup over one batch. On duplicate IDs the first
/// record wins.
#[derive(Debug, Default)]
pub struct Population<'a> {
    by_id: HashMap<ContactId, &'a Contact>,
}

impl<'a> Population<'a> {
    pub fn new(contacts: impl IntoIterator<Item = &'a Contact>) -> Self {
        let mut by_id = HashMap::new();
        for contact in contacts {
            by_id.entry(contact.id).or_insert(contact);
        }
        Self { by_id }
    }

    pub fn get(&self, id: ContactId) -> Option<&'a Contact> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// A contact discovered by relation traversal, with its depth at first discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkEntry {
    pub contact: Contact,
    pub depth: usize,
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// Parse a contacts JSON artifact (array of contact objects).
///
/// Self-references in `Relations` are removed on load.
pub fn parse_contacts(json: &str) -> Result<Vec<Contact>, MergeError> {
    let mut contacts: Vec<Contact> =
        serde_json::from_str(json).map_err(|e| MergeError::InputArtifact(e.to_string()))?;

    for contact in &mut contacts {
        let own = contact.id;
        let before = contact.relations.len();
        contact.relations.retain(|r| *r != own);
        if contact.relations.len() != before {
            tracing::debug!(id = %own, "dropped self-relation");
        }
    }

    Ok(contacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_artifact_fields() {
        let raw = json!([{
            "ID": 7,
            "First Name": "Walter",
            "Last Name": "Harris",
            "Age": 71,
            "Deceased": false,
            "Relations": [9, 7],
            "Relation to Owner": "Parent",
            "Contact Addresses": [{"City": "Macon"}],
            "Foreclosures": null,
            "Traced": true,
            "Birth Year": 1955
        }]);
        let contacts = parse_contacts(&raw.to_string()).unwrap();
        let c = &contacts[0];
        assert_eq!(c.id, ContactId(7));
        assert_eq!(c.age, Some(71));
        assert_eq!(c.relations, vec![ContactId(9)]); // self-relation dropped
        assert!(c.foreclosures.is_empty());
        assert_eq!(c.addresses[0].text("City"), Some("Macon"));
        assert!(c.is_traced());
        assert_eq!(c.field_value("Birth Year"), Some(json!(1955)));
    }

    #[test]
    fn lenient_age_accepts_float_and_string() {
        let a: Contact = serde_json::from_value(json!({"ID": 1, "Age": 42.0})).unwrap();
        assert_eq!(a.age, Some(42));
        let b: Contact = serde_json::from_value(json!({"ID": 2, "Age": "35"})).unwrap();
        assert_eq!(b.age, Some(35));
        let c: Contact = serde_json::from_value(json!({"ID": 3, "Age": "n/a"})).unwrap();
        assert_eq!(c.age, None);
    }

    #[test]
    fn populated_count_ignores_blank_and_null() {
        let c: Contact = serde_json::from_value(json!({
            "ID": 1,
            "First Name": "Ann",
            "Last Name": "  ",
            "Phone": null,
            "Relations": [],
            "Company Name": "",
            "Maiden Name": "Lee"
        }))
        .unwrap();
        // ID, First Name, Maiden Name
        assert_eq!(c.populated_field_count(), 3);
    }

    #[test]
    fn owner_and_age_helpers() {
        let c = Contact {
            relation_to_owner: Some(" OWNER ".into()),
            age: Some(0),
            ..Default::default()
        };
        assert!(c.is_owner());
        assert_eq!(c.known_age(), None);
        assert!(!c.has_name());
    }

    #[test]
    fn unreadable_artifact_is_an_error() {
        let err = parse_contacts("{not json").unwrap_err();
        assert!(matches!(err, MergeError::InputArtifact(_)));
    }
}
