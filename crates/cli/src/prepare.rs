//! `kinsync convert`, `kinsync filter`, `kinsync compare`: the offline
//! steps that turn vendor CSVs into contacts and measure them against the CRM.

use std::path::PathBuf;

use chrono::Datelike;
use tracing::info;

use kinsync_recon::compare::{compare, Winner};
use kinsync_recon::filter::filter_for_comparison;
use kinsync_recon::vendor::{convert_csv, BatchContext};

use crate::artifacts::{read_contacts, read_text, write_json};
use crate::CliError;

// ── convert ─────────────────────────────────────────────────────────

pub fn cmd_convert(
    inputs: Vec<PathBuf>,
    out: Option<PathBuf>,
    year: Option<i32>,
) -> Result<(), CliError> {
    if inputs.is_empty() {
        return Err(CliError::args("no vendor CSV files given"));
    }

    // One context across files keeps IDs unique in the combined artifact.
    let reference_year = year.unwrap_or_else(|| chrono::Local::now().year());
    let mut ctx = BatchContext::new(reference_year);
    let mut contacts = Vec::new();

    for path in &inputs {
        let text = read_text(path)?;
        let converted = convert_csv(&text, &mut ctx)
            .map_err(|e| CliError::merge(e).with_hint(path.display().to_string()))?;
        info!(file = %path.display(), contacts = converted.len(), "converted vendor file");
        contacts.extend(converted);
    }

    write_json(&contacts, out.as_deref())?;

    let owners = contacts.iter().filter(|c| c.is_owner()).count();
    let relations: usize = contacts.iter().map(|c| c.relations.len()).sum();
    eprintln!(
        "converted {} file(s): {} contacts ({} owners, {} relatives, {} relation links)",
        inputs.len(),
        contacts.len(),
        owners,
        contacts.len() - owners,
        relations,
    );
    Ok(())
}

// ── filter ──────────────────────────────────────────────────────────

pub fn cmd_filter(idi: PathBuf, airtable: PathBuf, out: Option<PathBuf>) -> Result<(), CliError> {
    let vendor = read_contacts(&idi)?;
    let crm = read_contacts(&airtable)?;

    let filtered = filter_for_comparison(&vendor, &crm);
    write_json(&filtered, out.as_deref())?;

    eprintln!(
        "filtered: {} IDI + {} Airtable contacts (of {})",
        vendor.len(),
        filtered.len() - vendor.len(),
        crm.len(),
    );
    Ok(())
}

// ── compare ─────────────────────────────────────────────────────────

pub fn cmd_compare(filtered: PathBuf, idi: PathBuf, out: Option<PathBuf>) -> Result<(), CliError> {
    let filtered = read_contacts(&filtered)?;
    let vendor = read_contacts(&idi)?;

    let report = compare(&filtered, &vendor);
    write_json(&report, out.as_deref())?;

    match &report.summary {
        Some(s) => {
            let won = |w: Winner| s.winners.get(&w).copied().unwrap_or(0);
            eprintln!(
                "compared {} contacts: avg Airtable {:.2}, avg IDI {:.2}; IDI better {}, Airtable better {}, tie {}",
                s.total_comparisons,
                s.average_airtable,
                s.average_idi,
                won(Winner::Vendor),
                won(Winner::Crm),
                won(Winner::Tie),
            );
        }
        None => eprintln!("compared 0 contacts: no traced Airtable contact has an IDI counterpart"),
    }
    Ok(())
}
