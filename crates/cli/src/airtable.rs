//! Airtable REST adapter for the engine's [`ContactRepository`].
//!
//! One blocking client serves both the contacts and the properties table.
//! Every request goes through [`AirtableRepository::request_with_retry`]:
//!
//! - requests are paced (Airtable allows 5 requests per second per base)
//! - 401/403/400/422 and other 4xx fail immediately
//! - 429, 5xx and transport errors retry with exponential backoff,
//!   honoring `Retry-After` on 429

use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use kinsync_recon::repository::{ContactRepository, Record};
use kinsync_recon::{ExternalId, FieldMap, RepositoryError};

use crate::exit_codes;
use crate::settings::AirtableSettings;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

pub(crate) const MAX_RETRIES: u32 = 3;
const USER_AGENT: &str = concat!("kinsync/", env!("CARGO_PKG_VERSION"));
const DEFAULT_PACING: Duration = Duration::from_millis(200);
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Link field on a property record pointing back at its contact.
const PROPERTY_OWNER_FIELD: &str = "Contacts";

/// Fields requested by a name search.
const SEARCH_FIELDS: &[&str] = &[
    "First Name",
    "Last Name",
    "Middle Name",
    "Suffix",
    "Age",
    "Phone",
    "Email",
    "Relation to Owner",
    "Foreclosures",
];

// ── Formula ─────────────────────────────────────────────────────────

/// Escape a value for a single-quoted Airtable formula string.
fn escape_formula(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Case-insensitive first + last name equality formula.
pub(crate) fn name_formula(first: &str, last: &str) -> String {
    format!(
        "AND(UPPER({{First Name}})=UPPER('{}'), UPPER({{Last Name}})=UPPER('{}'))",
        escape_formula(first),
        escape_formula(last),
    )
}

/// Airtable errors come as `{"error": {"type", "message"}}` or `{"error": "TYPE"}`.
fn extract_error(body: &Value, status: u16) -> String {
    match body.get("error") {
        Some(Value::Object(err)) => err
            .get("message")
            .or_else(|| err.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}")),
        Some(Value::String(kind)) => kind.clone(),
        _ => format!("HTTP {status}"),
    }
}

// ── Repository ──────────────────────────────────────────────────────

pub struct AirtableRepository {
    http: Client,
    token: String,
    contacts_url: Url,
    properties_url: Url,
    pacing: Duration,
    initial_backoff: Duration,
    last_request: Option<Instant>,
}

impl AirtableRepository {
    pub fn new(settings: &AirtableSettings) -> Result<Self, CliError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CliError {
                code: exit_codes::EXIT_ERROR,
                message: format!("failed to build HTTP client: {e}"),
                hint: None,
            })?;

        let table_url = |table: &str| -> Result<Url, CliError> {
            let mut url = Url::parse(&settings.api_url).map_err(|e| {
                CliError::args(format!("invalid Airtable API URL '{}': {e}", settings.api_url))
            })?;
            url.path_segments_mut()
                .map_err(|_| {
                    CliError::args(format!("Airtable API URL '{}' cannot be a base", settings.api_url))
                })?
                .pop_if_empty()
                .push(&settings.base_id)
                .push(table);
            Ok(url)
        };

        Ok(Self {
            http,
            token: settings.token.clone(),
            contacts_url: table_url(&settings.contacts_table)?,
            properties_url: table_url(&settings.properties_table)?,
            pacing: DEFAULT_PACING,
            initial_backoff: DEFAULT_BACKOFF,
            last_request: None,
        })
    }

    #[cfg(test)]
    fn with_timing(mut self, pacing: Duration, initial_backoff: Duration) -> Self {
        self.pacing = pacing;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Read one record from the contacts table so auth and table names fail
    /// fast, before any contact is processed.
    pub fn check_connection(&mut self) -> Result<(), RepositoryError> {
        let url = self.contacts_url.clone();
        self.request_with_retry(|http| http.get(url.clone()).query(&[("maxRecords", "1")]))
            .map(|_| ())
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.pacing {
                thread::sleep(self.pacing - elapsed);
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Send a request with retry + exponential backoff.
    ///
    /// `build_request` is called once per attempt and must return a fully
    /// configured `RequestBuilder` (URL, query, body). Auth is added here.
    fn request_with_retry(
        &mut self,
        build_request: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<Value, RepositoryError> {
        let mut backoff = self.initial_backoff;

        for attempt in 0..=MAX_RETRIES {
            self.pace();
            let result = build_request(&self.http).bearer_auth(&self.token).send();

            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    // Network/timeout errors: retry
                    if attempt == MAX_RETRIES {
                        return Err(RepositoryError::Transport(format!(
                            "{e} (after {MAX_RETRIES} retries)"
                        )));
                    }
                    warn!(attempt = attempt + 1, max = MAX_RETRIES, wait = ?backoff, error = %e, "retrying Airtable request");
                    thread::sleep(backoff);
                    backoff *= 2;
                    continue;
                }
            };

            let status = resp.status().as_u16();

            if status == 429 || status >= 500 {
                if attempt == MAX_RETRIES {
                    return Err(if status == 429 {
                        RepositoryError::RateLimited { attempts: MAX_RETRIES + 1 }
                    } else {
                        RepositoryError::Transport(format!(
                            "upstream error {status} after {MAX_RETRIES} retries"
                        ))
                    });
                }

                let wait = if status == 429 {
                    resp.headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or(backoff)
                } else {
                    backoff
                };

                warn!(attempt = attempt + 1, max = MAX_RETRIES, wait = ?wait, status, "retrying Airtable request");
                thread::sleep(wait);
                backoff *= 2;
                continue;
            }

            // Read as text first; tolerate a BOM-prefixed body.
            let text = resp
                .text()
                .map_err(|e| RepositoryError::Transport(format!("failed to read body: {e}")))?;
            let trimmed = text.trim_start_matches('\u{feff}');

            if status >= 400 {
                let body: Value = serde_json::from_str(trimmed).unwrap_or(Value::Null);
                return Err(RepositoryError::Rejected {
                    status,
                    message: extract_error(&body, status),
                });
            }

            return serde_json::from_str(trimmed).map_err(|e| {
                let excerpt: String = trimmed.chars().take(200).collect();
                RepositoryError::Decode(format!("{e} (body: {excerpt})"))
            });
        }

        Err(RepositoryError::Transport("retry loop exhausted".into()))
    }

    fn send_fields(&mut self, method: Method, url: Url, fields: &FieldMap) -> Result<Value, RepositoryError> {
        let body = json!({ "fields": fields });
        self.request_with_retry(|http| http.request(method.clone(), url.clone()).json(&body))
    }
}

fn record_from(value: &Value) -> Result<Record, RepositoryError> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| RepositoryError::Decode("record without id".into()))?;
    let fields = match value.get("fields") {
        Some(Value::Object(fields)) => fields.clone(),
        _ => FieldMap::new(),
    };
    Ok(Record::new(id, fields))
}

fn record_id(value: &Value) -> Result<ExternalId, RepositoryError> {
    record_from(value).map(|r| r.id)
}

impl ContactRepository for AirtableRepository {
    fn search_by_name(
        &mut self,
        first: &str,
        last: &str,
        limit: usize,
    ) -> Result<Vec<Record>, RepositoryError> {
        let mut query: Vec<(&str, String)> = vec![
            ("filterByFormula", name_formula(first, last)),
            ("maxRecords", limit.to_string()),
        ];
        query.extend(SEARCH_FIELDS.iter().map(|f| ("fields[]", f.to_string())));

        let url = self.contacts_url.clone();
        let body = self.request_with_retry(|http| http.get(url.clone()).query(&query))?;
        let records = body
            .get("records")
            .and_then(Value::as_array)
            .ok_or_else(|| RepositoryError::Decode("search response without records".into()))?;

        let records = records.iter().map(record_from).collect::<Result<Vec<_>, _>>()?;
        debug!(first, last, found = records.len(), "Airtable search");
        Ok(records)
    }

    fn create(&mut self, fields: FieldMap) -> Result<ExternalId, RepositoryError> {
        let url = self.contacts_url.clone();
        let body = self.send_fields(Method::POST, url, &fields)?;
        record_id(&body)
    }

    fn update(&mut self, id: &ExternalId, fields: FieldMap) -> Result<(), RepositoryError> {
        let mut url = self.contacts_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id.as_str());
        }
        self.send_fields(Method::PATCH, url, &fields).map(|_| ())
    }

    fn create_property(
        &mut self,
        mut fields: FieldMap,
        owner: &ExternalId,
    ) -> Result<ExternalId, RepositoryError> {
        fields.insert(PROPERTY_OWNER_FIELD.into(), json!([owner.as_str()]));
        let url = self.properties_url.clone();
        let body = self.send_fields(Method::POST, url, &fields)?;
        record_id(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn repo_for(server: &MockServer) -> AirtableRepository {
        let settings = AirtableSettings {
            token: "pat_test".into(),
            base_id: "appBASE".into(),
            contacts_table: "Contacts".into(),
            properties_table: "Properties".into(),
            api_url: server.base_url(),
        };
        AirtableRepository::new(&settings)
            .unwrap()
            .with_timing(Duration::ZERO, Duration::from_millis(1))
    }

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn formula_escapes_quotes_and_backslashes() {
        assert_eq!(
            name_formula("D'Angelo", "Back\\slash"),
            "AND(UPPER({First Name})=UPPER('D\\'Angelo'), UPPER({Last Name})=UPPER('Back\\\\slash'))"
        );
    }

    #[test]
    fn search_sends_formula_and_parses_records() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/appBASE/Contacts")
                .header("authorization", "Bearer pat_test")
                .query_param("filterByFormula", name_formula("Walter", "Harris"))
                .query_param("maxRecords", "10");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "records": [
                        {"id": "recA", "createdTime": "2024-01-01T00:00:00.000Z",
                         "fields": {"First Name": "Walter", "Age": 70}},
                        {"id": "recB", "fields": {}}
                    ]
                }));
        });

        let mut repo = repo_for(&server);
        let records = repo.search_by_name("Walter", "Harris", 10).unwrap();
        mock.assert();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, ExternalId::new("recA"));
        assert_eq!(records[0].age(), Some(70));
        assert!(records[1].fields.is_empty());
    }

    #[test]
    fn create_posts_fields_and_returns_id() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/appBASE/Contacts")
                .json_body(json!({"fields": {"First Name": "Ann", "IDI": true}}));
            then.status(200).json_body(json!({"id": "recNEW", "fields": {}}));
        });

        let mut repo = repo_for(&server);
        let id = repo
            .create(fields(json!({"First Name": "Ann", "IDI": true})))
            .unwrap();
        mock.assert();
        assert_eq!(id, ExternalId::new("recNEW"));
    }

    #[test]
    fn update_patches_record_path() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PATCH)
                .path("/appBASE/Contacts/recA")
                .json_body(json!({"fields": {"Relations": ["recB"]}}));
            then.status(200).json_body(json!({"id": "recA", "fields": {}}));
        });

        let mut repo = repo_for(&server);
        repo.update(&ExternalId::new("recA"), fields(json!({"Relations": ["recB"]})))
            .unwrap();
        mock.assert();
    }

    #[test]
    fn property_links_owner() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/appBASE/Properties")
                .json_body(json!({"fields": {"City": "Macon", "Contacts": ["recA"]}}));
            then.status(200).json_body(json!({"id": "recPROP", "fields": {}}));
        });

        let mut repo = repo_for(&server);
        let id = repo
            .create_property(fields(json!({"City": "Macon"})), &ExternalId::new("recA"))
            .unwrap();
        mock.assert();
        assert_eq!(id, ExternalId::new("recPROP"));
    }

    #[test]
    fn auth_failure_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/appBASE/Contacts");
            then.status(401)
                .json_body(json!({"error": {"type": "AUTHENTICATION_REQUIRED", "message": "Authentication required"}}));
        });

        let mut repo = repo_for(&server);
        let err = repo.check_connection().unwrap_err();
        mock.assert_calls(1);
        match err {
            RepositoryError::Rejected { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Authentication required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rate_limit_retries_then_gives_up() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/appBASE/Contacts");
            then.status(429).header("retry-after", "0");
        });

        let mut repo = repo_for(&server);
        let err = repo.search_by_name("Ann", "Lee", 5).unwrap_err();
        mock.assert_calls((MAX_RETRIES + 1) as usize);
        assert!(matches!(err, RepositoryError::RateLimited { attempts: 4 }));
    }

    #[test]
    fn server_error_exhausts_as_transport() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/appBASE/Contacts");
            then.status(503);
        });

        let mut repo = repo_for(&server);
        let err = repo.create(FieldMap::new()).unwrap_err();
        mock.assert_calls((MAX_RETRIES + 1) as usize);
        assert!(matches!(err, RepositoryError::Transport(_)));
    }

    #[test]
    fn string_error_body_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PATCH).path("/appBASE/Contacts/recGONE");
            then.status(404).json_body(json!({"error": "NOT_FOUND"}));
        });

        let mut repo = repo_for(&server);
        let err = repo
            .update(&ExternalId::new("recGONE"), FieldMap::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "request rejected (404): NOT_FOUND");
    }

    #[test]
    fn non_json_body_excerpt_respects_char_boundaries() {
        let server = MockServer::start();
        let body = format!("{}é and more", "x".repeat(199));
        server.mock(|when, then| {
            when.method(POST).path("/appBASE/Contacts");
            then.status(200).body(body.clone());
        });

        let mut repo = repo_for(&server);
        let err = repo.create(FieldMap::new()).unwrap_err();
        match err {
            RepositoryError::Decode(message) => {
                assert!(message.contains(&format!("{}é)", "x".repeat(199))), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn table_urls_are_joined_and_encoded() {
        let settings = AirtableSettings {
            token: "pat_test".into(),
            base_id: "appBASE".into(),
            contacts_table: "My Contacts".into(),
            properties_table: "tblPROPS".into(),
            api_url: "https://api.airtable.com/v0".into(),
        };
        let repo = AirtableRepository::new(&settings).unwrap();
        assert_eq!(
            repo.contacts_url.as_str(),
            "https://api.airtable.com/v0/appBASE/My%20Contacts"
        );
        assert_eq!(
            repo.properties_url.as_str(),
            "https://api.airtable.com/v0/appBASE/tblPROPS"
        );
    }
}
