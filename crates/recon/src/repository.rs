//! The CRM store as the engine sees it.

use serde_json::Value;

use crate::error::RepositoryError;
use crate::model::{age_from_value, ExternalId, FieldMap};

/// A record returned by the store: its stable identifier plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: ExternalId,
    pub fields: FieldMap,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id: ExternalId::new(id),
            fields,
        }
    }

    /// Non-zero age, if the record carries one.
    pub fn age(&self) -> Option<u32> {
        self.fields.get("Age").and_then(age_from_value).filter(|a| *a > 0)
    }

    /// Linked foreclosure record IDs.
    pub fn foreclosures(&self) -> Vec<String> {
        self.fields
            .get("Foreclosures")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Find/create/update access to the CRM's contact and property tables.
///
/// Calls are blocking. Implementations own retries and pacing; the engine
/// treats every `Err` as "this contact could not be processed".
pub trait ContactRepository {
    /// Records whose first and last name equal the given ones, ignoring case.
    /// At most `limit` records.
    fn search_by_name(
        &mut self,
        first: &str,
        last: &str,
        limit: usize,
    ) -> Result<Vec<Record>, RepositoryError>;

    fn create(&mut self, fields: FieldMap) -> Result<ExternalId, RepositoryError>;

    fn update(&mut self, id: &ExternalId, fields: FieldMap) -> Result<(), RepositoryError>;

    /// Create a property record linked to `owner`.
    fn create_property(
        &mut self,
        fields: FieldMap,
        owner: &ExternalId,
    ) -> Result<ExternalId, RepositoryError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// One mutating call observed by [`MemoryRepository`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Create { id: ExternalId, fields: FieldMap },
    Update { id: ExternalId, fields: FieldMap },
    Property { id: ExternalId, owner: ExternalId, fields: FieldMap },
}

/// In-memory [`ContactRepository`]. Backs dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    contacts: Vec<Record>,
    properties: Vec<(Record, ExternalId)>,
    writes: Vec<WriteOp>,
    searches: usize,
    next_id: u64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            contacts: records.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Seed from a CRM export: a JSON array of `{"id": ..., "fields": {...}}`
    /// objects, or of flat objects carrying `id` next to the fields.
    pub fn from_export(json: &str) -> Result<Self, RepositoryError> {
        let rows: Vec<FieldMap> =
            serde_json::from_str(json).map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for (index, mut row) in rows.into_iter().enumerate() {
            let id = match row.remove("id") {
                Some(Value::String(id)) => id,
                _ => format!("export{index}"),
            };
            row.remove("createdTime");
            let fields = match row.remove("fields") {
                Some(Value::Object(fields)) => fields,
                _ => row,
            };
            records.push(Record::new(id, fields));
        }
        Ok(Self::with_records(records))
    }

    pub fn records(&self) -> &[Record] {
        &self.contacts
    }

    pub fn record(&self, id: &ExternalId) -> Option<&Record> {
        self.contacts.iter().find(|r| &r.id == id)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&Record, &ExternalId)> {
        self.properties.iter().map(|(r, owner)| (r, owner))
    }

    pub fn writes(&self) -> &[WriteOp] {
        &self.writes
    }

    pub fn search_count(&self) -> usize {
        self.searches
    }

    fn fresh_id(&mut self, prefix: &str) -> ExternalId {
        self.next_id += 1;
        ExternalId::new(format!("{prefix}{:04}", self.next_id))
    }
}

impl ContactRepository for MemoryRepository {
    fn search_by_name(
        &mut self,
        first: &str,
        last: &str,
        limit: usize,
    ) -> Result<Vec<Record>, RepositoryError> {
        self.searches += 1;
        let same = |field: Option<&str>, wanted: &str| {
            field.unwrap_or("").to_uppercase() == wanted.to_uppercase()
        };
        Ok(self
            .contacts
            .iter()
            .filter(|r| same(r.text("First Name"), first) && same(r.text("Last Name"), last))
            .take(limit)
            .cloned()
            .collect())
    }

    fn create(&mut self, fields: FieldMap) -> Result<ExternalId, RepositoryError> {
        let id = self.fresh_id("rec");
        self.writes.push(WriteOp::Create {
            id: id.clone(),
            fields: fields.clone(),
        });
        self.contacts.push(Record {
            id: id.clone(),
            fields,
        });
        Ok(id)
    }

    fn update(&mut self, id: &ExternalId, fields: FieldMap) -> Result<(), RepositoryError> {
        let record = self
            .contacts
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        record.fields.extend(fields.clone());
        self.writes.push(WriteOp::Update {
            id: id.clone(),
            fields,
        });
        Ok(())
    }

    fn create_property(
        &mut self,
        fields: FieldMap,
        owner: &ExternalId,
    ) -> Result<ExternalId, RepositoryError> {
        let id = self.fresh_id("prop");
        self.writes.push(WriteOp::Property {
            id: id.clone(),
            owner: owner.clone(),
            fields: fields.clone(),
        });
        self.properties.push((
            Record {
                id: id.clone(),
                fields,
            },
            owner.clone(),
        ));
        Ok(id)
    }
}
