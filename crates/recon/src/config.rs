use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MergeError;
use crate::merge::is_mergeable;
use crate::model::FieldMap;
use crate::property::is_property_owned;

/// Fields written by dedicated passes; a stamp may never clobber them.
pub const LINK_FIELDS: &[&str] = &["Relations", "Contact Addresses", "Foreclosures"];

// ---------------------------------------------------------------------------
// Merge policy
// ---------------------------------------------------------------------------

/// Tunables for one sync run.
///
/// The two age thresholds are independent: the deduplicator compares records
/// from the same batch, the matcher compares a batch record against the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergePolicy {
    /// Relation traversal depth. Contacts found at this depth are kept but not expanded.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_dedup_age_threshold")]
    pub dedup_age_threshold: u32,
    #[serde(default = "default_match_age_threshold")]
    pub match_age_threshold: u32,
    /// Cap on records returned by a name search.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Written on every contact create/update, before merged fields.
    #[serde(default = "default_stamps")]
    pub stamps: FieldMap,
    /// Written on every created property record.
    #[serde(default = "default_property_stamps")]
    pub property_stamps: FieldMap,
}

fn default_max_depth() -> usize {
    2
}

fn default_dedup_age_threshold() -> u32 {
    2
}

fn default_match_age_threshold() -> u32 {
    5
}

fn default_search_limit() -> usize {
    10
}

fn default_stamps() -> FieldMap {
    let mut stamps = FieldMap::new();
    stamps.insert("IDI".into(), Value::Bool(true));
    stamps.insert("Traced".into(), Value::Bool(true));
    stamps.insert("Entity Type".into(), Value::String("Person".into()));
    stamps
}

fn default_property_stamps() -> FieldMap {
    let mut stamps = FieldMap::new();
    stamps.insert("IDI".into(), Value::Bool(true));
    stamps
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            dedup_age_threshold: default_dedup_age_threshold(),
            match_age_threshold: default_match_age_threshold(),
            search_limit: default_search_limit(),
            stamps: default_stamps(),
            property_stamps: default_property_stamps(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl MergePolicy {
    pub fn from_toml(input: &str) -> Result<Self, MergeError> {
        let policy: MergePolicy =
            toml::from_str(input).map_err(|e| MergeError::ConfigParse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        if !(1..=100).contains(&self.search_limit) {
            return Err(MergeError::ConfigValidation(format!(
                "search_limit must be between 1 and 100, got {}",
                self.search_limit
            )));
        }

        for field in self.stamps.keys() {
            if is_mergeable(field) {
                return Err(MergeError::ConfigValidation(format!(
                    "stamp '{field}' collides with a merged field"
                )));
            }
            if LINK_FIELDS.contains(&field.as_str()) {
                return Err(MergeError::ConfigValidation(format!(
                    "stamp '{field}' collides with a link field"
                )));
            }
        }

        for field in self.property_stamps.keys() {
            if is_property_owned(field) {
                return Err(MergeError::ConfigValidation(format!(
                    "property stamp '{field}' collides with a property field"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let policy = MergePolicy::from_toml("").unwrap();
        assert_eq!(policy, MergePolicy::default());
        assert_eq!(policy.max_depth, 2);
        assert_eq!(policy.dedup_age_threshold, 2);
        assert_eq!(policy.match_age_threshold, 5);
        assert_eq!(policy.search_limit, 10);
        assert_eq!(policy.stamps["Entity Type"], Value::String("Person".into()));
    }

    #[test]
    fn overrides_and_custom_stamps() {
        let input = r#"
max_depth = 1
match_age_threshold = 3

[stamps]
IDI = true
"Lead Source" = "Skip trace"
"#;
        let policy = MergePolicy::from_toml(input).unwrap();
        assert_eq!(policy.max_depth, 1);
        assert_eq!(policy.match_age_threshold, 3);
        assert_eq!(policy.dedup_age_threshold, 2);
        assert_eq!(policy.stamps.len(), 2);
        assert_eq!(policy.stamps["Lead Source"], Value::String("Skip trace".into()));
    }

    #[test]
    fn rejects_search_limit_out_of_range() {
        let err = MergePolicy::from_toml("search_limit = 0").unwrap_err();
        assert!(matches!(err, MergeError::ConfigValidation(_)));
        let err = MergePolicy::from_toml("search_limit = 101").unwrap_err();
        assert!(matches!(err, MergeError::ConfigValidation(_)));
    }

    #[test]
    fn rejects_stamp_on_merged_or_link_field() {
        let err = MergePolicy::from_toml("[stamps]\n\"Phone\" = \"x\"").unwrap_err();
        assert!(err.to_string().contains("Phone"));
        let err = MergePolicy::from_toml("[stamps]\nRelations = []").unwrap_err();
        assert!(err.to_string().contains("link field"));
    }

    #[test]
    fn rejects_property_stamp_on_written_field() {
        for field in ["Type", "Contacts", "City"] {
            let input = format!("[property_stamps]\n\"{field}\" = \"x\"");
            let err = MergePolicy::from_toml(&input).unwrap_err();
            assert!(matches!(err, MergeError::ConfigValidation(_)), "{field}");
            assert!(err.to_string().contains(field));
        }

        let policy = MergePolicy::from_toml("[property_stamps]\nIDI = true\nSource = \"IDI\"").unwrap();
        assert_eq!(policy.property_stamps.len(), 2);
    }

    #[test]
    fn unknown_key_is_a_parse_error() {
        let err = MergePolicy::from_toml("max_dept = 3").unwrap_err();
        assert!(matches!(err, MergeError::ConfigParse(_)));
    }
}
