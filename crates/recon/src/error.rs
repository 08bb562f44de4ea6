use thiserror::Error;

use crate::model::ExternalId;

/// Failures that stop a stage before any contact is processed.
#[derive(Debug, Error)]
pub enum MergeError {
    /// TOML parse / deserialization error.
    #[error("policy parse error: {0}")]
    ConfigParse(String),
    /// Policy validation error (limit out of range, stamp collides with a merge field, ...).
    #[error("policy validation error: {0}")]
    ConfigValidation(String),
    /// Contacts artifact could not be read or parsed.
    #[error("unreadable contacts artifact: {0}")]
    InputArtifact(String),
    /// Vendor CSV header could not be decoded.
    #[error("vendor file error: {0}")]
    VendorDecode(String),
}

/// Failures reported by a [`crate::repository::ContactRepository`].
///
/// The sync orchestrator catches these per contact; they never abort a batch.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The store answered but refused the request (4xx other than 429).
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// Still throttled after the configured retries.
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },
    /// Network failure or 5xx after retries.
    #[error("transport error: {0}")]
    Transport(String),
    /// Response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
    /// Update target does not exist.
    #[error("record not found: {0}")]
    NotFound(ExternalId),
}
