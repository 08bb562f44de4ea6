//! Connection settings and merge policy resolution.
//!
//! Precedence for every Airtable setting: flag > environment > default
//! (token and base id have no default).

use std::path::Path;

use clap::Args;

use kinsync_recon::MergePolicy;

use crate::exit_codes;
use crate::CliError;

pub const ENV_TOKEN: &str = "AIRTABLE_API_TOKEN";
pub const ENV_BASE_ID: &str = "AIRTABLE_BASE_ID";
pub const ENV_CONTACTS_TABLE: &str = "AIRTABLE_CONTACTS_TABLE";
pub const ENV_PROPERTIES_TABLE: &str = "AIRTABLE_PROPERTIES_TABLE";
pub const ENV_API_URL: &str = "AIRTABLE_API_URL";

const DEFAULT_CONTACTS_TABLE: &str = "Contacts";
const DEFAULT_PROPERTIES_TABLE: &str = "Properties";
const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";

/// Airtable flags shared by commands that talk to the CRM.
#[derive(Debug, Clone, Default, Args)]
pub struct AirtableArgs {
    /// Airtable personal access token [env: AIRTABLE_API_TOKEN]
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Airtable base id (app...) [env: AIRTABLE_BASE_ID]
    #[arg(long, value_name = "ID")]
    pub base: Option<String>,

    /// Contacts table name or id [env: AIRTABLE_CONTACTS_TABLE]
    #[arg(long, value_name = "TABLE")]
    pub contacts_table: Option<String>,

    /// Properties table name or id [env: AIRTABLE_PROPERTIES_TABLE]
    #[arg(long, value_name = "TABLE")]
    pub properties_table: Option<String>,

    /// API root URL [env: AIRTABLE_API_URL]
    #[arg(long, value_name = "URL", hide = true)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirtableSettings {
    pub token: String,
    pub base_id: String,
    pub contacts_table: String,
    pub properties_table: String,
    pub api_url: String,
}

impl AirtableSettings {
    pub fn resolve(args: AirtableArgs) -> Result<Self, CliError> {
        Self::resolve_with(args, |name| std::env::var(name).ok())
    }

    /// Resolve against an explicit environment lookup.
    pub fn resolve_with(
        args: AirtableArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CliError> {
        let pick = |flag: Option<String>, var: &str| {
            flag.or_else(|| env(var))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = pick(args.token, ENV_TOKEN).ok_or_else(|| CliError {
            code: exit_codes::EXIT_AIRTABLE_NOT_AUTH,
            message: format!("missing Airtable API token (use --token or set {ENV_TOKEN})"),
            hint: Some("use --dry-run to sync against a local CRM export".into()),
        })?;
        let base_id = pick(args.base, ENV_BASE_ID).ok_or_else(|| {
            CliError::args(format!("missing Airtable base id (use --base or set {ENV_BASE_ID})"))
        })?;

        Ok(Self {
            token,
            base_id,
            contacts_table: pick(args.contacts_table, ENV_CONTACTS_TABLE)
                .unwrap_or_else(|| DEFAULT_CONTACTS_TABLE.into()),
            properties_table: pick(args.properties_table, ENV_PROPERTIES_TABLE)
                .unwrap_or_else(|| DEFAULT_PROPERTIES_TABLE.into()),
            api_url: pick(args.api_url, ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.into()),
        })
    }
}

/// Load and validate a merge policy. No path means the defaults.
pub fn load_policy(path: Option<&Path>) -> Result<MergePolicy, CliError> {
    let Some(path) = path else {
        return Ok(MergePolicy::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::config(format!("cannot read policy {}: {e}", path.display()))
    })?;
    MergePolicy::from_toml(&text).map_err(|e| CliError::merge(e).with_hint(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn flag_beats_env() {
        let args = AirtableArgs {
            token: Some("flagtok".into()),
            base: Some("appFLAG".into()),
            ..Default::default()
        };
        let env = env_of(&[(ENV_TOKEN, "envtok"), (ENV_BASE_ID, "appENV")]);
        let settings = AirtableSettings::resolve_with(args, env).unwrap();
        assert_eq!(settings.token, "flagtok");
        assert_eq!(settings.base_id, "appFLAG");
        assert_eq!(settings.contacts_table, "Contacts");
        assert_eq!(settings.properties_table, "Properties");
        assert_eq!(settings.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn env_fills_missing_flags() {
        let env = env_of(&[
            (ENV_TOKEN, " envtok "),
            (ENV_BASE_ID, "appENV"),
            (ENV_CONTACTS_TABLE, "tblC"),
        ]);
        let settings = AirtableSettings::resolve_with(AirtableArgs::default(), env).unwrap();
        assert_eq!(settings.token, "envtok");
        assert_eq!(settings.contacts_table, "tblC");
    }

    #[test]
    fn missing_token_is_not_auth() {
        let env = env_of(&[(ENV_BASE_ID, "appENV"), (ENV_TOKEN, "  ")]);
        let err = AirtableSettings::resolve_with(AirtableArgs::default(), env).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_AIRTABLE_NOT_AUTH);
    }

    #[test]
    fn missing_base_is_usage() {
        let env = env_of(&[(ENV_TOKEN, "tok")]);
        let err = AirtableSettings::resolve_with(AirtableArgs::default(), env).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_USAGE);
    }

    #[test]
    fn policy_file_is_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "search_limit = 0").unwrap();
        let err = load_policy(Some(file.path())).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_CONFIG_INVALID);

        let missing = load_policy(Some(Path::new("/nonexistent/policy.toml"))).unwrap_err();
        assert_eq!(missing.code, exit_codes::EXIT_CONFIG_INVALID);

        assert_eq!(load_policy(None).unwrap(), MergePolicy::default());
    }
}
