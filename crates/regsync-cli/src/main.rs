//! Registry back-office CLI
//!
//! Operator tools for the synchronization system.
//!
//! # Commands
//!
//! - `sync` - Synchronize one domain against the registry
//! - `quick-sync` - Re-confirm every stale domain under a time budget
//! - `list` - List domains in the local database
//! - `import` - Import domains from a back-office CSV export
//! - `renew` - Submit a renewal and track it to confirmation
//! - `check` - Ask the registry whether a name is registered
//!
//! The database file is given with `--store`; the zones the registry
//! serves with `--zones` or `REGSYNC_ZONES`. Online commands read the
//! bridge coordinates from `REGSYNC_GATEWAY_BASE_URL` and
//! `REGSYNC_GATEWAY_API_TOKEN`.

mod commands;

use std::env;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Registry back-office command-line tools.
#[derive(Parser)]
#[command(name = "regsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the registry database file
    #[arg(global = true, short, long, default_value = "registry.json")]
    store: PathBuf,

    /// Comma-separated zone suffixes, e.g. `com,net` (or REGSYNC_ZONES)
    #[arg(global = true, short, long)]
    zones: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize one domain against the registry
    Sync {
        /// Domain name to synchronize
        domain: String,

        /// Overwrite contact profiles instead of filling blanks
        #[arg(long)]
        rewrite_contacts: bool,

        /// Allow the local owner to change to the remote registrant
        #[arg(long)]
        allow_owner_change: bool,

        /// Allow creating an account for an unknown remote registrant
        #[arg(long)]
        allow_new_owner: bool,

        /// Remove the row outright when the registry confirms deletion
        #[arg(long)]
        hard_delete: bool,
    },

    /// Re-confirm every stale domain under a time budget
    QuickSync {
        /// Staleness threshold in hours
        #[arg(long, default_value = "24")]
        hours: u32,

        /// Wall-clock budget in seconds
        #[arg(long, default_value = "300")]
        budget_secs: u64,
    },

    /// List domains in the local database
    List {
        /// Only rows with this status, e.g. ACTIVE or TO_BE_DELETED
        #[arg(long)]
        status: Option<String>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Import domains from a back-office CSV export
    Import {
        /// Path of the CSV file
        file: PathBuf,

        /// Validate and count without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Submit a renewal and track it to confirmation
    Renew {
        /// Domain name to renew
        domain: String,

        /// Owner account email paying for the renewal
        #[arg(long)]
        owner: String,

        /// Billing order id behind the renewal
        #[arg(long)]
        order: u64,

        /// Registration years to add
        #[arg(long, default_value = "1")]
        years: u32,

        /// Billing order id for the restore fee, for restores
        #[arg(long)]
        restore_order: Option<u64>,
    },

    /// Ask the registry whether a name is registered
    Check {
        /// Domain name to check
        domain: String,
    },
}

/// Resolve the zone list from the flag or `REGSYNC_ZONES`
fn resolve_zones(flag: Option<String>) -> Result<Vec<String>> {
    let raw = match flag {
        Some(value) => value,
        None => env::var("REGSYNC_ZONES").unwrap_or_default(),
    };
    let zones: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().trim_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if zones.is_empty() {
        anyhow::bail!("No zones configured. Pass --zones com,net or set REGSYNC_ZONES");
    }
    Ok(zones)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging before any command runs
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync {
            domain,
            rewrite_contacts,
            allow_owner_change,
            allow_new_owner,
            hard_delete,
        } => {
            let zones = resolve_zones(cli.zones)?;
            commands::sync::run(
                &cli.store,
                &zones,
                &domain,
                rewrite_contacts,
                allow_owner_change,
                allow_new_owner,
                hard_delete,
            )
            .await?;
        }
        Commands::QuickSync { hours, budget_secs } => {
            let zones = resolve_zones(cli.zones)?;
            commands::quick_sync::run(&cli.store, &zones, hours, budget_secs).await?;
        }
        Commands::List { status, format } => {
            commands::list::run(&cli.store, status.as_deref(), &format).await?;
        }
        Commands::Import { file, dry_run } => {
            let zones = resolve_zones(cli.zones)?;
            commands::import::run(&cli.store, &zones, &file, dry_run).await?;
        }
        Commands::Renew {
            domain,
            owner,
            order,
            years,
            restore_order,
        } => {
            let zones = resolve_zones(cli.zones)?;
            commands::renew::run(&cli.store, &zones, &domain, &owner, order, years, restore_order)
                .await?;
        }
        Commands::Check { domain } => {
            let zones = resolve_zones(cli.zones)?;
            commands::check::run(&cli.store, &zones, &domain).await?;
        }
    }

    Ok(())
}
