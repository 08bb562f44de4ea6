//! `kinsync sync`: push a contacts artifact into Airtable.

use std::path::{Path, PathBuf};

use tracing::info;

use kinsync_recon::repository::{ContactRepository, MemoryRepository, WriteOp};
use kinsync_recon::sync::{OutcomeStatus, SyncReport, SyncRun};
use kinsync_recon::{Contact, ContactId, MergePolicy};

use crate::airtable::AirtableRepository;
use crate::artifacts::{read_contacts, read_text, write_json};
use crate::exit_codes::{repository_exit_code, EXIT_INPUT_UNREADABLE, EXIT_SYNC_FAILURES};
use crate::settings::{load_policy, AirtableArgs, AirtableSettings};
use crate::CliError;

pub struct SyncOptions {
    pub contacts: PathBuf,
    pub seeds: Vec<u64>,
    pub policy: Option<PathBuf>,
    pub dry_run: bool,
    pub existing: Option<PathBuf>,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub airtable: AirtableArgs,
}

pub fn cmd_sync(opts: SyncOptions) -> Result<(), CliError> {
    if opts.existing.is_some() && !opts.dry_run {
        return Err(CliError::args("--existing requires --dry-run"));
    }

    // Policy and artifact are checked before anything touches the CRM.
    let policy = load_policy(opts.policy.as_deref())?;
    let contacts = read_contacts(&opts.contacts)?;
    let seeds: Vec<ContactId> = opts.seeds.iter().copied().map(ContactId).collect();
    info!(contacts = contacts.len(), seeds = seeds.len(), "loaded contacts artifact");

    let report = if opts.dry_run {
        let mut repo = match &opts.existing {
            Some(path) => load_export(path)?,
            None => MemoryRepository::new(),
        };
        let report = run(&mut repo, &policy, &contacts, &seeds);
        print_dry_run(&repo);
        report
    } else {
        let settings = AirtableSettings::resolve(opts.airtable)?;
        let mut repo = AirtableRepository::new(&settings)?;
        repo.check_connection().map_err(|e| CliError {
            code: repository_exit_code(&e),
            message: format!("cannot reach Airtable table '{}': {e}", settings.contacts_table),
            hint: Some("check the token scopes, base id and table names".into()),
        })?;
        run(&mut repo, &policy, &contacts, &seeds)
    };

    if let Some(path) = &opts.output {
        write_json(&report, Some(path))?;
    }
    if opts.json {
        write_json(&report, None)?;
    }
    print_summary(&report);

    if report.has_failures() {
        return Err(CliError {
            code: EXIT_SYNC_FAILURES,
            message: format!(
                "{} contact(s) and {} relation update(s) failed",
                report.failed(),
                report.relation_failures,
            ),
            hint: Some("rerun with --json to see per-contact reasons".into()),
        });
    }
    Ok(())
}

fn run<R: ContactRepository>(
    repo: &mut R,
    policy: &MergePolicy,
    contacts: &[Contact],
    seeds: &[ContactId],
) -> SyncReport {
    SyncRun::new(repo, policy).execute(contacts, seeds)
}

fn load_export(path: &Path) -> Result<MemoryRepository, CliError> {
    let text = read_text(path)?;
    MemoryRepository::from_export(&text).map_err(|e| CliError {
        code: EXIT_INPUT_UNREADABLE,
        message: format!("cannot parse CRM export {}: {e}", path.display()),
        hint: None,
    })
}

fn print_dry_run(repo: &MemoryRepository) {
    let (mut creates, mut updates, mut properties) = (0, 0, 0);
    for write in repo.writes() {
        match write {
            WriteOp::Create { .. } => creates += 1,
            WriteOp::Update { .. } => updates += 1,
            WriteOp::Property { .. } => properties += 1,
        }
    }
    eprintln!(
        "dry run: {} writes planned ({} creates, {} updates, {} properties), {} searches",
        repo.writes().len(),
        creates,
        updates,
        properties,
        repo.search_count(),
    );
}

fn print_summary(report: &SyncReport) {
    let depths: Vec<String> = report
        .depth_breakdown
        .iter()
        .map(|(depth, n)| format!("depth {depth}: {n}"))
        .collect();
    eprintln!(
        "sync: {} discovered ({}), {} duplicates removed",
        report.discovered,
        depths.join(", "),
        report.duplicates_removed,
    );
    eprintln!(
        "      {} created, {} updated, {} skipped, {} failed; {} properties, {} relation updates",
        report.created(),
        report.updated(),
        report.skipped(),
        report.failed(),
        report.properties_created,
        report.relation_updates,
    );
    for outcome in &report.outcomes {
        if let OutcomeStatus::Failed { reason } = &outcome.status {
            eprintln!("      failed: {} (id {}): {}", outcome.name, outcome.id, reason);
        }
    }
}
