//! `kinsync-recon`: contact identity-resolution and merge engine.
//!
//! Pure engine crate: receives pre-loaded contacts, talks to the CRM only
//! through [`ContactRepository`]. No CLI or network dependencies.

pub mod compare;
pub mod config;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod format;
pub mod household;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod network;
pub mod normalize;
pub mod propagate;
pub mod property;
pub mod repository;
pub mod score;
pub mod sync;
pub mod vendor;

pub use config::MergePolicy;
pub use error::{MergeError, RepositoryError};
pub use model::{parse_contacts, Contact, ContactId, ExternalId, FieldMap};
pub use repository::{ContactRepository, MemoryRepository, Record};
pub use sync::{SyncReport, SyncRun};
