//! # directorio-admin
//!
//! Offline management commands for the Directorio client directory:
//!
//! - **import** -- bulk-load clients (and their logos) from a spreadsheet
//!   export, matching on business identifier
//! - **sweep** -- permanently remove clients soft-deleted longer ago than the
//!   retention window
//! - **dedupe** -- collapse clients sharing a business identifier, keeping
//!   the newest record
//! - **add-user** / **list-users** -- bootstrap identities and their access
//!   tokens
//!
//! All commands operate directly on the SQLite database; the import acts
//! through the same role-gated mutation contract as the HTTP API.

mod import;
mod natural;

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use directorio_store::maintenance::DEFAULT_RETENTION_DAYS;
use directorio_store::{Database, Role};

#[derive(Parser)]
#[command(
    name = "directorio-admin",
    about = "Offline management commands for the Directorio client directory",
    version
)]
struct Cli {
    /// Explicit SQLite database path (defaults to the platform data directory).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bulk-import clients (and optionally logos) from a spreadsheet export.
    Import {
        /// CSV export of the spreadsheet (columns: client, company, id).
        #[arg(long)]
        spreadsheet: PathBuf,

        /// Directory of logo images, paired with spreadsheet rows by order.
        #[arg(long)]
        logos: Option<PathBuf>,

        /// Directory the paired logo files are copied into.
        #[arg(long, default_value = "./logos")]
        media: PathBuf,

        /// Username the import acts as (must be allowed to edit clients).
        #[arg(long = "as", value_name = "USERNAME")]
        actor: String,
    },

    /// Permanently remove clients soft-deleted past the retention window.
    Sweep {
        /// Retention window in days.
        #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS)]
        days: i64,
    },

    /// Collapse clients sharing a business identifier, keeping the newest.
    Dedupe,

    /// Create an identity and print its access token.
    AddUser {
        username: String,

        /// viewer | admin | superadmin
        #[arg(long, default_value = "viewer")]
        role: Role,

        /// Grant the superuser flag (overrides the role check everywhere).
        #[arg(long)]
        superuser: bool,
    },

    /// List identities.
    ListUsers,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let db = match &cli.db {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    match cli.command {
        Command::Import {
            spreadsheet,
            logos,
            media,
            actor,
        } => {
            let actor = db
                .identity_by_username(&actor)
                .with_context(|| format!("acting user '{actor}' not found"))?;
            let report = import::run(&db, &actor, &spreadsheet, logos.as_deref(), &media)?;
            println!("{report}");
        }

        Command::Sweep { days } => {
            let removed = db.purge_expired_clients(days, Utc::now())?;
            println!("{removed} clients permanently removed.");
        }

        Command::Dedupe => {
            let report = db.dedupe_clients()?;
            for group in &report.groups {
                println!(
                    "id '{}': kept {}, removed {}",
                    group.business_identifier, group.kept, group.removed
                );
            }
            println!("{} duplicate records removed.", report.total_removed);
        }

        Command::AddUser {
            username,
            role,
            superuser,
        } => {
            let identity = db.create_identity(&username, role, superuser)?;
            println!(
                "Created '{}' with role {}{}.",
                identity.username,
                identity.role,
                if identity.is_superuser {
                    " (superuser)"
                } else {
                    ""
                }
            );
            println!("Access token: {}", identity.access_token);
        }

        Command::ListUsers => {
            for identity in db.list_identities()? {
                println!(
                    "{:<20} {:<10} superuser={}",
                    identity.username,
                    identity.role.as_str(),
                    identity.is_superuser
                );
            }
        }
    }

    Ok(())
}
