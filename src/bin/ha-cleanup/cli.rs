use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Home Assistant registry cleanup
#[derive(Parser, Debug)]
#[command(name = "ha-cleanup", version, about = "Home Assistant registry / recorder cleanup")]
pub struct Cli {
    /// Home Assistant config dir (default: HA_CONFIG_DIR, /homeassistant, /config, ~/.homeassistant)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pre-confirm destructive actions (manual-stop acknowledgement is still asked)
    #[arg(long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Find and remove entities whose device, config entry or definition is gone
    Orphans {
        #[arg(long)]
        dry_run: bool,
    },
    /// Entities named `<base>_N` whose `<base>` is free; rename the selected ones
    Duplicates {
        #[arg(long)]
        dry_run: bool,
        /// Selection, e.g. "1,3-5" or "all" (asked interactively if omitted)
        #[arg(long)]
        select: Option<String>,
    },
    /// Clear deleted_entities / deleted_devices tombstones
    Deleted {
        #[arg(long)]
        dry_run: bool,
    },
    /// Purge old recorder rows (states/events) and VACUUM
    PurgeDb {
        #[arg(long)]
        dry_run: bool,
        /// Override purge_keep_days
        #[arg(long)]
        days: Option<u64>,
    },
    /// Delete registry snapshots older than the retention window
    PruneBackups {
        #[arg(long)]
        dry_run: bool,
        /// Retention in days (default HA_BACKUP_RETENTION_DAYS or 7)
        #[arg(long)]
        days: Option<u64>,
    },
    /// List registry snapshots, newest first
    Snapshots,
    /// Show deleted / new / modified entities between a snapshot and the live registry
    Diff {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Restore selected deleted entities from a snapshot
    Restore {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        select: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Replace the live registry with a snapshot
    RestoreFull {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Orphans + deleted items + recorder purge + snapshot retention, in one host stop
    Run {
        #[arg(long)]
        dry_run: bool,
    },
}
