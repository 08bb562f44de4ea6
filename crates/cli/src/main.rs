// kinsync CLI - vendor/CRM contact reconciliation

mod airtable;
mod artifacts;
mod exit_codes;
mod prepare;
mod settings;
mod sync;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kinsync_recon::MergeError;

use exit_codes::{merge_exit_code, EXIT_CONFIG_INVALID, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};
use settings::AirtableArgs;

#[derive(Parser)]
#[command(name = "kinsync")]
#[command(about = "Reconcile skip-trace vendor contacts with an Airtable CRM")]
#[command(version)]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only (overrides RUST_LOG)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert IDI skip-trace CSV exports into a contacts artifact
    #[command(after_help = "\
Examples:
  kinsync convert batch1.csv batch2.csv --out idi_contacts.json
  kinsync convert batch.csv --year 2025 | jq length")]
    Convert {
        /// IDI CSV files (IDs continue across files)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Reference year for birth-year calculation (default: current year)
        #[arg(long)]
        year: Option<i32>,
    },

    /// Keep the Airtable contacts that overlap an IDI batch
    #[command(after_help = "\
Examples:
  kinsync filter --idi idi_contacts.json --airtable contacts.json --out filtered.json")]
    Filter {
        /// Contacts artifact produced by `convert`
        #[arg(long)]
        idi: PathBuf,

        /// Airtable contacts export (contacts artifact shape)
        #[arg(long)]
        airtable: PathBuf,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Score traced Airtable contacts against their IDI counterparts
    #[command(after_help = "\
Examples:
  kinsync compare --filtered filtered.json --idi idi_contacts.json --out quality.json")]
    Compare {
        /// Output of `filter`
        #[arg(long)]
        filtered: PathBuf,

        /// Contacts artifact produced by `convert`
        #[arg(long)]
        idi: PathBuf,

        /// Report file (omit for stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Match, merge and link a contacts artifact into Airtable
    #[command(after_help = "\
Examples:
  kinsync sync idi_contacts.json --seed 12 --seed 40
  kinsync sync idi_contacts.json --policy policy.toml --json
  kinsync sync idi_contacts.json --dry-run --existing contacts_export.json --output report.json

Exit codes:
  0   every contact synced
  3   contacts artifact or CRM export unreadable
  4   policy file invalid
  5   sync finished but some contacts failed
  50  no Airtable token
  51-54  Airtable rejected the connection check")]
    Sync {
        /// Contacts artifact (JSON array)
        contacts: PathBuf,

        /// Seed contact ID (repeatable; omit to seed every contact)
        #[arg(long = "seed", value_name = "ID")]
        seeds: Vec<u64>,

        /// Merge policy TOML
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Run against an in-memory CRM; nothing is written to Airtable
        #[arg(long)]
        dry_run: bool,

        /// CRM export to seed the in-memory CRM (requires --dry-run)
        #[arg(long, value_name = "EXPORT")]
        existing: Option<PathBuf>,

        /// Print the sync report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the sync report JSON to a file
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        airtable: AirtableArgs,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // stdout is reserved for JSON output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Convert { inputs, out, year } => prepare::cmd_convert(inputs, out, year),
        Commands::Filter { idi, airtable, out } => prepare::cmd_filter(idi, airtable, out),
        Commands::Compare { filtered, idi, out } => prepare::cmd_compare(filtered, idi, out),
        Commands::Sync {
            contacts,
            seeds,
            policy,
            dry_run,
            existing,
            json,
            output,
            airtable,
        } => sync::cmd_sync(sync::SyncOptions {
            contacts,
            seeds,
            policy,
            dry_run,
            existing,
            json,
            output,
            airtable,
        }),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG_INVALID, message: msg.into(), hint: None }
    }

    /// Create error from an engine stage error with its exit code.
    pub fn merge(err: MergeError) -> Self {
        Self { code: merge_exit_code(&err), message: err.to_string(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
