//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Scripts driving `kinsync` rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                                   |
//! |---------|------------------|-----------------------------------------------|
//! | 0       | Universal        | Success                                       |
//! | 1       | Universal        | General error (unspecified)                   |
//! | 2       | Universal        | CLI usage error (bad args)                    |
//! | 3-9     | merge            | Input artifacts, policy, per-contact failures |
//! | 50-59   | airtable         | CRM connection and upstream errors            |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use kinsync_recon::{MergeError, RepositoryError};

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Merge (3-9)
// =============================================================================

/// An input artifact (contacts JSON, vendor CSV, CRM export) could not be
/// read or parsed. Nothing was processed.
pub const EXIT_INPUT_UNREADABLE: u8 = 3;

/// Merge policy file is malformed or fails validation.
pub const EXIT_CONFIG_INVALID: u8 = 4;

/// Sync ran to completion but at least one contact failed.
pub const EXIT_SYNC_FAILURES: u8 = 5;

// =============================================================================
// Airtable (50-59)
// =============================================================================

/// No API token provided (neither flag nor env var).
pub const EXIT_AIRTABLE_NOT_AUTH: u8 = 50;

/// Auth rejected by Airtable (401/403).
pub const EXIT_AIRTABLE_AUTH: u8 = 51;

/// Request rejected by Airtable (400/422).
pub const EXIT_AIRTABLE_VALIDATION: u8 = 52;

/// Rate limited after retries (429).
pub const EXIT_AIRTABLE_RATE_LIMIT: u8 = 53;

/// Upstream error (5xx, other 4xx) or network failure after retries.
pub const EXIT_AIRTABLE_UPSTREAM: u8 = 54;

// =============================================================================
// Error mapping
// =============================================================================

/// Map an engine stage error to its exit code.
pub fn merge_exit_code(err: &MergeError) -> u8 {
    match err {
        MergeError::ConfigParse(_) | MergeError::ConfigValidation(_) => EXIT_CONFIG_INVALID,
        MergeError::InputArtifact(_) | MergeError::VendorDecode(_) => EXIT_INPUT_UNREADABLE,
    }
}

/// Map a repository error to its exit code.
pub fn repository_exit_code(err: &RepositoryError) -> u8 {
    match err {
        RepositoryError::Rejected { status: 401 | 403, .. } => EXIT_AIRTABLE_AUTH,
        RepositoryError::Rejected { status: 400 | 422, .. } => EXIT_AIRTABLE_VALIDATION,
        RepositoryError::RateLimited { .. } => EXIT_AIRTABLE_RATE_LIMIT,
        RepositoryError::Rejected { .. }
        | RepositoryError::Transport(_)
        | RepositoryError::Decode(_)
        | RepositoryError::NotFound(_) => EXIT_AIRTABLE_UPSTREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_INPUT_UNREADABLE,
            EXIT_CONFIG_INVALID,
            EXIT_SYNC_FAILURES,
            EXIT_AIRTABLE_NOT_AUTH,
            EXIT_AIRTABLE_AUTH,
            EXIT_AIRTABLE_VALIDATION,
            EXIT_AIRTABLE_RATE_LIMIT,
            EXIT_AIRTABLE_UPSTREAM,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn repository_errors_map_by_status() {
        let rejected = |status| RepositoryError::Rejected {
            status,
            message: String::new(),
        };
        assert_eq!(repository_exit_code(&rejected(401)), EXIT_AIRTABLE_AUTH);
        assert_eq!(repository_exit_code(&rejected(403)), EXIT_AIRTABLE_AUTH);
        assert_eq!(repository_exit_code(&rejected(422)), EXIT_AIRTABLE_VALIDATION);
        assert_eq!(repository_exit_code(&rejected(404)), EXIT_AIRTABLE_UPSTREAM);
        assert_eq!(
            repository_exit_code(&RepositoryError::RateLimited { attempts: 3 }),
            EXIT_AIRTABLE_RATE_LIMIT
        );
    }

    #[test]
    fn policy_errors_are_config_invalid() {
        let err = MergeError::ConfigValidation("search_limit".into());
        assert_eq!(merge_exit_code(&err), EXIT_CONFIG_INVALID);
        let err = MergeError::InputArtifact("eof".into());
        assert_eq!(merge_exit_code(&err), EXIT_INPUT_UNREADABLE);
    }
}
