//! Field-level merge of batch data into CRM records.
//!
//! Existing non-empty values are never overwritten. Flags are the exception:
//! an incoming boolean is always written.

use serde_json::Value;
use tracing::debug;

use crate::format::{format_text, FieldClass};
use crate::model::{Contact, FieldMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text(FieldClass),
    Number,
    Flag,
}

/// Every field the merge engine may write, with its kind.
pub const MERGEABLE_FIELDS: &[(&str, FieldKind)] = &[
    ("First Name", FieldKind::Text(FieldClass::Name)),
    ("Middle Name", FieldKind::Text(FieldClass::Name)),
    ("Last Name", FieldKind::Text(FieldClass::Name)),
    ("Maiden Name", FieldKind::Text(FieldClass::Name)),
    ("Suffix", FieldKind::Text(FieldClass::General)),
    ("Company Name", FieldKind::Text(FieldClass::General)),
    ("Sex", FieldKind::Text(FieldClass::General)),
    ("DOB", FieldKind::Text(FieldClass::General)),
    ("Age", FieldKind::Number),
    ("Birth Year", FieldKind::Number),
    ("Phone", FieldKind::Text(FieldClass::Phone)),
    ("Email", FieldKind::Text(FieldClass::Email)),
    ("Relation to Owner", FieldKind::Text(FieldClass::Relation)),
    ("Deceased", FieldKind::Flag),
    ("Bankruptcy", FieldKind::Flag),
    ("In Jail", FieldKind::Flag),
];

pub fn is_mergeable(field: &str) -> bool {
    MERGEABLE_FIELDS.iter().any(|(name, _)| *name == field)
}

/// Null, missing, blank string, numeric zero or empty list.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::Array(a)) => a.is_empty(),
        Some(_) => false,
    }
}

/// The mergeable fields a batch contact carries, unformatted.
pub fn contact_fields(contact: &Contact) -> FieldMap {
    MERGEABLE_FIELDS
        .iter()
        .filter_map(|(field, _)| contact.field_value(field).map(|v| (field.to_string(), v)))
        .collect()
}

/// Merge `new` into `existing`. The result holds every mergeable field that
/// ends up non-empty: new values (formatted) where the existing one was
/// empty, existing values everywhere else.
pub fn merge_fields(new: &FieldMap, existing: &FieldMap) -> FieldMap {
    let mut merged = FieldMap::new();

    for &(field, kind) in MERGEABLE_FIELDS {
        let incoming = new.get(field);
        let current = existing.get(field);

        if kind == FieldKind::Flag {
            if let Some(Value::Bool(flag)) = incoming {
                merged.insert(field.to_string(), Value::Bool(*flag));
            } else if let Some(current) = current.filter(|v| !v.is_null()) {
                merged.insert(field.to_string(), current.clone());
            }
            continue;
        }

        if is_empty_value(current) {
            if let Some(value) = incoming.filter(|v| !is_empty_value(Some(*v))) {
                let value = format_value(value, kind);
                debug!(field, ?value, "filling empty field");
                merged.insert(field.to_string(), value);
            }
        } else if let Some(current) = current {
            merged.insert(field.to_string(), current.clone());
        }
    }

    merged
}

/// Fields of a brand-new record: every non-empty mergeable field, formatted.
pub fn prepare_new_fields(new: &FieldMap) -> FieldMap {
    merge_fields(new, &FieldMap::new())
}

/// Entries of `merged` that differ from `existing`; what an update must send.
pub fn changed_fields(merged: &FieldMap, existing: &FieldMap) -> FieldMap {
    merged
        .iter()
        .filter(|(field, value)| existing.get(field.as_str()) != Some(*value))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

fn format_value(value: &Value, kind: FieldKind) -> Value {
    match (kind, value) {
        (FieldKind::Text(class), Value::String(s)) => Value::String(format_text(s, class)),
        (FieldKind::Number, Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        _ => value.clone(),
    }
}
