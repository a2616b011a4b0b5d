use anyhow::Result;
use std::time::{Duration, SystemTime};

use HaCleanup::prompt::{Operator, TerminalOperator};
use HaCleanup::snapshots::prune_snapshots;
use HaCleanup::CleanupConfig;

use crate::util;

pub fn retention(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(86_400))
}

pub fn exec(cfg: &CleanupConfig, dry_run: bool, days: Option<u64>, yes: bool) -> Result<()> {
    util::dry_run_banner(dry_run);
    let days = days.unwrap_or(cfg.backup_retention_days);
    let dir = cfg.storage_dir();
    let now = SystemTime::now();

    let preview = prune_snapshots(&dir, retention(days), now, true);
    for p in &preview.removed {
        println!("  {}", p.display());
    }
    println!(
        "{} snapshot(s) older than {} days, {} kept",
        preview.removed_count(),
        days,
        preview.kept
    );
    if preview.removed.is_empty() || dry_run {
        return Ok(());
    }

    // снапшоты HA не читает, останавливать его не нужно
    let mut op = TerminalOperator::new(yes);
    if !op.confirm(&format!(
        "Delete {} snapshot(s) from {}?",
        preview.removed_count(),
        dir.display()
    )) {
        println!("Aborted");
        return Ok(());
    }
    let report = prune_snapshots(&dir, retention(days), now, false);
    println!(
        "Removed {} old snapshot(s), {} failed",
        report.removed_count(),
        report.failed
    );
    Ok(())
}
