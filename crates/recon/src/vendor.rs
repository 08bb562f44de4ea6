//! Skip-trace vendor (IDI) CSV decoding and conversion into contacts.
//!
//! One CSV row describes an owner, up to five relatives and up to two
//! address blocks. [`convert_row`] turns it into linked [`Contact`]s using a
//! [`BatchContext`] for ID assignment.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::MergeError;
use crate::format::{format_phone, title_case};
use crate::model::{Address, Contact, ContactId, FieldMap};

const MAX_RELATIVES: usize = 5;

const STREET_SUFFIXES: &[&str] = &[
    "ST", "STREET", "AVE", "AVENUE", "RD", "ROAD", "LN", "LANE", "DR", "DRIVE", "CT", "COURT",
    "BLVD", "BOULEVARD", "PL", "PLACE",
];

/// Property attribute columns → property field names.
const PROPERTY_ATTRIBUTES: &[(&str, &str)] = &[
    ("PROP: Assessed Value", "Assessed Value"),
    ("PROP: Market Value", "Market Value"),
    ("PROP: Purchase Date", "Purchase Date"),
    ("PROP: Purchase Amount", "Purchase Amount"),
    ("PROP: Square Feet", "Square Feet"),
    ("PROP: Lot Size", "Lot Size"),
    ("PROP: Parcel ID Number", "Parcel ID"),
];

// ---------------------------------------------------------------------------
// Decoded rows
// ---------------------------------------------------------------------------

/// Vendor `Y` / `N` / `U` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    Yes,
    No,
    #[default]
    Unknown,
}

impl TriState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "Y" => Self::Yes,
            "N" => Self::No,
            _ => Self::Unknown,
        }
    }

    /// Only an explicit `Y` is true.
    pub fn as_bool(self) -> bool {
        self == Self::Yes
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressBlock {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub county: String,
    pub first_seen: String,
    pub last_seen: String,
    /// Extra property attributes (field name, raw value), non-empty only.
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorRelative {
    pub first: String,
    pub middle: String,
    pub last: String,
    pub suffix: String,
    pub age: String,
    pub relationship: String,
    pub phone: String,
    pub email: String,
    pub address: AddressBlock,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorRow {
    pub first: String,
    pub middle: String,
    pub last: String,
    pub age: String,
    pub deceased: TriState,
    pub bankrupt: TriState,
    pub phone: String,
    pub current_address: AddressBlock,
    pub property_address: AddressBlock,
    pub relatives: Vec<VendorRelative>,
}

/// Header name → column index. Missing columns read as empty.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.index
            .get(name)
            .and_then(|i| record.get(*i))
            .map(str::trim)
            .unwrap_or("")
    }

    fn first_non_empty<'r>(&self, record: &'r csv::StringRecord, names: &[String]) -> &'r str {
        names
            .iter()
            .map(|n| self.get(record, n))
            .find(|v| !v.is_empty())
            .unwrap_or("")
    }
}

/// Decode every row of a vendor CSV. Rows that fail to parse are logged and skipped.
pub fn decode_vendor_rows(csv_text: &str) -> Result<Vec<VendorRow>, MergeError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| MergeError::VendorDecode(format!("header row: {e}")))?;
    let columns = Columns {
        index: headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
            .collect(),
    };

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push(decode_record(&columns, &record)),
            Err(e) => warn!(row = row_idx + 1, error = %e, "undecodable vendor row, skipping"),
        }
    }
    Ok(rows)
}

fn decode_record(columns: &Columns, record: &csv::StringRecord) -> VendorRow {
    let get = |name: &str| columns.get(record, name).to_string();
    let first_of = |names: &[&str]| {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        columns.first_non_empty(record, &names).to_string()
    };

    let current_address = AddressBlock {
        street: get("ADD: Address1"),
        city: get("ADD: Address1 City"),
        state: get("ADD: Address1 State"),
        zip: get("ADD: Address1 Zip"),
        county: get("ADD: Address1 County"),
        first_seen: get("ADD: Address1 First Seen"),
        last_seen: get("ADD: Address1 Last Seen"),
        attributes: Vec::new(),
    };

    let property_address = AddressBlock {
        street: get("PROP: Address Full"),
        city: get("PROP: City"),
        state: get("PROP: State"),
        zip: get("PROP: Zip"),
        county: get("PROP: County"),
        attributes: PROPERTY_ATTRIBUTES
            .iter()
            .map(|(column, field)| (field.to_string(), get(column)))
            .filter(|(_, value)| !value.is_empty())
            .collect(),
        ..AddressBlock::default()
    };

    let relatives = (1..=MAX_RELATIVES)
        .map(|n| {
            let col = |suffix: &str| format!("REL{n}: {suffix}");
            let numbered = |kind: &str| (1..=3).map(|i| col(&format!("{kind} {i}"))).collect::<Vec<_>>();
            VendorRelative {
                first: get(&col("First Name")),
                middle: get(&col("Middle Name")),
                last: get(&col("Last Name")),
                suffix: get(&col("Suffix")),
                age: get(&col("Age")),
                relationship: get(&col("Likely Relationship")),
                phone: columns.first_non_empty(record, &numbered("Phone")).to_string(),
                email: columns.first_non_empty(record, &numbered("Email")).to_string(),
                address: AddressBlock {
                    street: get(&col("Address")),
                    city: get(&col("City")),
                    state: get(&col("State")),
                    zip: get(&col("Zip")),
                    ..AddressBlock::default()
                },
            }
        })
        .filter(|rel| !rel.first.is_empty() || !rel.last.is_empty())
        .collect();

    VendorRow {
        first: first_of(&["PROP: First Name", "INPUT: First Name"]),
        last: first_of(&["PROP: Last Name", "INPUT: Last Name"]),
        middle: get("PROP: Middle Initial"),
        age: get("DOB: Age"),
        deceased: TriState::parse(&get("DEC: Deceased (Y/N/U)")),
        bankrupt: TriState::parse(&get("BNK: Bankrupt (Y/N/U)")),
        phone: first_of(&["PH: Phone1", "PH: Phone2", "PH: Phone3", "PH: Phone4", "PH: Phone5"]),
        current_address,
        property_address,
        relatives,
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Per-run conversion state: sequential contact IDs and the year ages are
/// measured against. Share one context across files to keep IDs unique.
#[derive(Debug, Clone)]
pub struct BatchContext {
    next_id: u64,
    reference_year: i32,
}

impl BatchContext {
    pub fn new(reference_year: i32) -> Self {
        Self {
            next_id: 1,
            reference_year,
        }
    }

    pub fn next_id(&mut self) -> ContactId {
        let id = ContactId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }
}

struct Person<'a> {
    first: &'a str,
    middle: &'a str,
    last: &'a str,
    suffix: &'a str,
    age: &'a str,
    phone: &'a str,
    email: &'a str,
    role: &'a str,
    deceased: bool,
    bankrupt: bool,
    addresses: Vec<Address>,
}

/// Contacts for one vendor row: the owner first (when named), then the
/// relatives. Owner and relatives link to each other through `Relations`.
pub fn convert_row(row: &VendorRow, ctx: &mut BatchContext) -> Vec<Contact> {
    let mut relatives: Vec<Contact> = row
        .relatives
        .iter()
        .map(|rel| {
            build_contact(
                Person {
                    first: &rel.first,
                    middle: &rel.middle,
                    last: &rel.last,
                    suffix: &rel.suffix,
                    age: &rel.age,
                    phone: &rel.phone,
                    email: &rel.email,
                    role: &rel.relationship,
                    deceased: false,
                    bankrupt: false,
                    addresses: build_address(&rel.address).into_iter().collect(),
                },
                ctx,
            )
        })
        .collect();

    if row.first.is_empty() && row.last.is_empty() {
        debug!(relatives = relatives.len(), "vendor row has no owner name");
        return relatives;
    }

    let addresses = [&row.current_address, &row.property_address]
        .into_iter()
        .filter_map(build_address)
        .collect();

    let mut owner = build_contact(
        Person {
            first: &row.first,
            middle: &row.middle,
            last: &row.last,
            suffix: "",
            age: &row.age,
            phone: &row.phone,
            email: "",
            role: "Owner",
            deceased: row.deceased.as_bool(),
            bankrupt: row.bankrupt.as_bool(),
            addresses,
        },
        ctx,
    );

    owner.relations = relatives.iter().map(|r| r.id).collect();
    for relative in &mut relatives {
        relative.relations.push(owner.id);
    }

    let mut contacts = Vec::with_capacity(relatives.len() + 1);
    contacts.push(owner);
    contacts.extend(relatives);
    contacts
}

/// Decode and convert a whole vendor CSV.
pub fn convert_csv(csv_text: &str, ctx: &mut BatchContext) -> Result<Vec<Contact>, MergeError> {
    let rows = decode_vendor_rows(csv_text)?;
    Ok(rows.iter().flat_map(|row| convert_row(row, ctx)).collect())
}

fn clean_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| title_case(raw))
}

fn non_empty(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

fn build_contact(person: Person<'_>, ctx: &mut BatchContext) -> Contact {
    let id = ctx.next_id();
    let first = clean_name(person.first);
    let middle = clean_name(person.middle);
    let last = clean_name(person.last);
    let suffix = clean_name(person.suffix);
    let age = (!person.age.is_empty() && person.age.chars().all(|c| c.is_ascii_digit()))
        .then(|| person.age.parse::<u32>().ok())
        .flatten();

    let mut extra = FieldMap::new();
    extra.insert("Entity Type".into(), Value::String("Person".into()));
    extra.insert("Traced".into(), Value::Bool(true));

    let display: Vec<String> = [&first, &last]
        .into_iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect();
    let display = if display.is_empty() {
        "contact".to_string()
    } else {
        display.join("-")
    };
    extra.insert("Contact".into(), Value::String(format!("{display}-{id}")));

    if let Some(m) = middle.as_deref().and_then(|m| m.chars().next()) {
        extra.insert("Middle Initial".into(), Value::String(m.to_string()));
    }
    if let (Some(f), Some(l)) = (&first, &last) {
        let full: Vec<&str> = [Some(f.as_str()), middle.as_deref(), Some(l.as_str()), suffix.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        extra.insert("Full Name".into(), Value::String(full.join(" ")));
        extra.insert("First and Last".into(), Value::String(format!("{f} {l}")));
    }
    if let Some(age) = age {
        extra.insert(
            "Birth Year".into(),
            Value::from(i64::from(ctx.reference_year()) - i64::from(age)),
        );
    }

    Contact {
        id,
        first_name: first,
        middle_name: middle,
        last_name: last,
        suffix,
        age,
        deceased: Some(person.deceased),
        bankruptcy: Some(person.bankrupt),
        phone: non_empty(person.phone).map(|p| format_phone(&p)),
        email: non_empty(person.email),
        relation_to_owner: non_empty(person.role),
        addresses: person.addresses,
        extra,
        ..Contact::default()
    }
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Street line split into number, name and suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreetParts {
    pub number: String,
    pub name: String,
    pub suffix: String,
}

/// A leading all-digit token (commas ignored) is the number; a trailing
/// token from the suffix list is the suffix.
pub fn parse_street(street: &str) -> StreetParts {
    let tokens: Vec<&str> = street.split_whitespace().collect();
    let Some((head, rest)) = tokens.split_first() else {
        return StreetParts::default();
    };

    let number = head.replace(',', "");
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return StreetParts {
            name: street.trim().to_string(),
            ..StreetParts::default()
        };
    }

    match rest.split_last() {
        Some((last, body)) if STREET_SUFFIXES.contains(&last.to_uppercase().as_str()) => {
            StreetParts {
                number,
                name: body.join(" "),
                suffix: last.to_uppercase(),
            }
        }
        _ => StreetParts {
            number,
            name: rest.join(" "),
            suffix: String::new(),
        },
    }
}

/// `YYYY-MM-DD` from `m/d/Y`, `m/d/y`, `Y-m-d` or `m-d-Y`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let formats: &[&str] = if raw.contains('/') {
        let year_len = raw.rsplit('/').next().map_or(0, str::len);
        if year_len == 2 {
            &["%m/%d/%y"]
        } else {
            &["%m/%d/%Y"]
        }
    } else {
        &["%Y-%m-%d", "%m-%d-%Y"]
    };
    formats
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Address sub-record for a block; `None` without street and city.
pub fn build_address(block: &AddressBlock) -> Option<Address> {
    let street = block.street.trim();
    let city = block.city.trim();
    if street.is_empty() && city.is_empty() {
        return None;
    }

    let mut fields = FieldMap::new();
    let mut put = |field: &str, value: &str| {
        if !value.is_empty() {
            fields.insert(field.into(), Value::String(value.to_string()));
        }
    };

    let full = match (street.is_empty(), city.is_empty()) {
        (false, false) => format!("{street} - {city}"),
        (false, true) => street.to_string(),
        _ => city.to_string(),
    };
    put("Address", &full);
    put("Type", "Contact");
    put("Country", "USA");
    put("Street 1", street);
    put("City", city);
    put("State", block.state.trim());
    put("Zip Code", block.zip.trim());
    put("County", block.county.trim());

    let parts = parse_street(street);
    put("Street Number", &parts.number);
    put("Street Name", &parts.name);
    put("Street Suffix", &parts.suffix);

    if let Some(date) = normalize_date(&block.first_seen) {
        put("First Seen", &date);
    }
    if let Some(date) = normalize_date(&block.last_seen) {
        put("Last Seen", &date);
    }
    for (field, value) in &block.attributes {
        put(field, value);
    }

    Some(Address(fields))
}
