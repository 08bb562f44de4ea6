//! Identity matching of a batch contact against the CRM.

use tracing::debug;

use crate::config::MergePolicy;
use crate::error::RepositoryError;
use crate::model::Contact;
use crate::repository::{ContactRepository, Record};

/// Find the existing CRM record for `candidate`.
///
/// Both first and last name are required; without them no search is issued.
/// Among the name matches the first one whose age is compatible wins. With
/// no age on either side the records are treated as the same person.
pub fn find_existing<R: ContactRepository + ?Sized>(
    candidate: &Contact,
    repo: &mut R,
    policy: &MergePolicy,
) -> Result<Option<Record>, RepositoryError> {
    let first = candidate.first_name.as_deref().unwrap_or("").trim();
    let last = candidate.last_name.as_deref().unwrap_or("").trim();
    if first.is_empty() || last.is_empty() {
        debug!(id = %candidate.id, "incomplete name, not searching");
        return Ok(None);
    }

    let found = repo.search_by_name(first, last, policy.search_limit)?;
    let total = found.len();

    let hit = found
        .into_iter()
        .take(policy.search_limit)
        .find(|record| {
            let compatible =
                age_compatible(candidate.known_age(), record.age(), policy.match_age_threshold);
            if !compatible {
                debug!(
                    id = %candidate.id,
                    record = %record.id,
                    candidate_age = ?candidate.known_age(),
                    record_age = ?record.age(),
                    "name match ruled out by age"
                );
            }
            compatible
        });

    if total > 1 && hit.is_some() {
        debug!(id = %candidate.id, total, "several name matches, taking first compatible");
    }
    Ok(hit)
}

/// Incompatible only when both ages are known, non-zero and further apart than `threshold`.
pub fn age_compatible(a: Option<u32>, b: Option<u32>, threshold: u32) -> bool {
    match (a.filter(|x| *x > 0), b.filter(|x| *x > 0)) {
        (Some(a), Some(b)) => a.abs_diff(b) <= threshold,
        _ => true,
    }
}
