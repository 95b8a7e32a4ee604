//! atlas - developer CLI for the encrypted clinical photo store
//!
//! Drives an `atlas_core::Repository` against a local directory, with the key
//! kept in a file-backed secret keeper. Not meant for real patient data.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use atlas_core::secret::FileSecretKeeper;
use atlas_core::{
    AuditEventKind, CaseId, PatientId, PhotoRole, Procedure, RasterCodec, ReminderId, Repository,
    StoreConfig,
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

mod commands;
mod notifier;

/// atlas - encrypted before/after photo store
#[derive(Parser, Debug)]
#[command(name = "atlas")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Application-support directory; the store lives in its
    /// `AtlasBeforeAfter` subdirectory
    #[arg(long, env = "ATLAS_ROOT")]
    root: Option<PathBuf>,

    /// Directory holding the key file (defaults to a per-service directory
    /// beside the store)
    #[arg(long, env = "ATLAS_KEY_DIR")]
    key_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Patient records
    #[command(subcommand)]
    Patient(PatientCommands),

    /// Surgical cases
    #[command(subcommand)]
    Case(CaseCommands),

    /// Encrypted case photographs
    #[command(subcommand)]
    Photo(PhotoCommands),

    /// Follow-up reminders
    #[command(subcommand)]
    Reminder(ReminderCommands),

    /// Consent signatures
    #[command(subcommand)]
    Consent(ConsentCommands),

    /// The audit log
    #[command(subcommand)]
    Audit(AuditCommands),

    /// Delete photo and consent blobs no record points at
    Reclaim,

    /// Erase every record, photo and signature (the key is kept)
    Reset {
        /// Confirm the erase
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PatientCommands {
    /// Add a patient
    Add {
        /// Full name
        name: String,

        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: Option<NaiveDate>,
    },

    /// List patients
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand, Debug)]
enum CaseCommands {
    /// Open a case for a patient
    Add {
        /// Patient id
        #[arg(long)]
        patient: PatientId,

        /// Case title
        title: String,

        /// Specialty
        #[arg(long, default_value = "Oculoplastics")]
        specialty: String,

        /// Procedure, by display name (e.g. "Upper Blepharoplasty")
        #[arg(long)]
        procedure: Option<Procedure>,
    },

    /// List cases
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand, Debug)]
enum PhotoCommands {
    /// Encrypt an image file into a case slot
    Attach {
        /// Case id
        #[arg(long)]
        case: CaseId,

        /// Slot (before or after)
        #[arg(long)]
        role: PhotoRole,

        /// JPEG or PNG file
        file: PathBuf,
    },

    /// Decrypt a case photo to a PNG for sharing
    Export {
        /// Case id
        #[arg(long)]
        case: CaseId,

        /// Slot (before or after)
        #[arg(long)]
        role: PhotoRole,

        /// Output directory (defaults to the system temp directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ReminderCommands {
    /// Schedule a reminder
    Add {
        /// Case id
        #[arg(long)]
        case: CaseId,

        /// Fire time (RFC 3339)
        #[arg(long, conflicts_with = "in_days")]
        at: Option<DateTime<Utc>>,

        /// Fire in this many days
        #[arg(long, default_value = "7")]
        in_days: i64,

        /// Notification text
        #[arg(default_value = "Follow-up photos")]
        message: String,
    },

    /// List pending reminders
    #[command(alias = "ls")]
    List,

    /// Cancel a reminder
    Cancel {
        /// Reminder id
        id: ReminderId,
    },
}

#[derive(Subcommand, Debug)]
enum ConsentCommands {
    /// Store a signed consent
    Add {
        /// Case id
        #[arg(long)]
        case: CaseId,

        /// Name of the signing patient
        #[arg(long)]
        patient_name: String,

        /// Procedure consented to
        #[arg(long)]
        procedure: Option<String>,

        /// Signature image (JPEG or PNG)
        signature: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum AuditCommands {
    /// Show the audit log, newest first
    #[command(alias = "ls")]
    List,

    /// Append an event (e.g. screenCaptureDetected)
    Record {
        /// Event kind
        kind: AuditEventKind,

        /// Related case id
        #[arg(long)]
        case: Option<CaseId>,

        /// Free-form details
        #[arg(long)]
        details: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_repository(cli: &Cli) -> eyre::Result<Repository> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => dirs::data_dir()
            .ok_or_else(|| eyre::eyre!("no data directory on this host; pass --root"))?,
    };
    let config = StoreConfig::new(root);
    let keeper = match &cli.key_dir {
        Some(key_dir) => FileSecretKeeper::new(key_dir),
        None => FileSecretKeeper::from_config(&config),
    }
    .wrap_err("opening key directory")?;
    tracing::debug!(dir = %keeper.directory().display(), "using file key store");
    Repository::open(
        config,
        Arc::new(keeper),
        Arc::new(RasterCodec),
        Arc::new(notifier::TracingNotifier),
    )
    .wrap_err("opening repository")
}

fn run(cli: Cli, out: &mut dyn Write) -> eyre::Result<()> {
    let mut repo = open_repository(&cli)?;
    match cli.command {
        Commands::Patient(PatientCommands::Add { name, dob }) => {
            commands::patient_add(&mut repo, out, name, dob)
        }
        Commands::Patient(PatientCommands::List) => commands::patient_list(&repo, out),
        Commands::Case(CaseCommands::Add {
            patient,
            title,
            specialty,
            procedure,
        }) => commands::case_add(&mut repo, out, patient, title, specialty, procedure),
        Commands::Case(CaseCommands::List) => commands::case_list(&repo, out),
        Commands::Photo(PhotoCommands::Attach { case, role, file }) => {
            commands::photo_attach(&mut repo, out, case, role, &file)
        }
        Commands::Photo(PhotoCommands::Export {
            case,
            role,
            out: dest,
        }) => {
            let dest = dest.unwrap_or_else(std::env::temp_dir);
            commands::photo_export(&mut repo, out, case, role, &dest)
        }
        Commands::Reminder(ReminderCommands::Add {
            case,
            at,
            in_days,
            message,
        }) => {
            let fire_date = match at {
                Some(at) => at,
                None => chrono::TimeDelta::try_days(in_days)
                    .and_then(|lead| Utc::now().checked_add_signed(lead))
                    .ok_or_else(|| eyre::eyre!("--in-days {in_days} is out of range"))?,
            };
            commands::reminder_add(&mut repo, out, case, fire_date, message)
        }
        Commands::Reminder(ReminderCommands::List) => commands::reminder_list(&repo, out),
        Commands::Reminder(ReminderCommands::Cancel { id }) => {
            commands::reminder_cancel(&mut repo, out, id)
        }
        Commands::Consent(ConsentCommands::Add {
            case,
            patient_name,
            procedure,
            signature,
        }) => commands::consent_add(&mut repo, out, case, patient_name, procedure, &signature),
        Commands::Audit(AuditCommands::List) => commands::audit_list(&repo, out),
        Commands::Audit(AuditCommands::Record {
            kind,
            case,
            details,
        }) => commands::audit_record(&mut repo, out, kind, case, details),
        Commands::Reclaim => commands::reclaim(&mut repo, out),
        Commands::Reset { yes } => {
            if !yes {
                eyre::bail!("refusing to erase the store without --yes");
            }
            commands::reset(&mut repo, out)
        }
    }
}

fn main() -> eyre::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let stdout = io::stdout();
    run(cli, &mut stdout.lock())
}
