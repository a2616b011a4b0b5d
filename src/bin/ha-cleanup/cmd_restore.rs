use anyhow::{Context, Result};
use log::warn;
use std::path::PathBuf;

use HaCleanup::prompt::{Operator, TerminalOperator};
use HaCleanup::selection::parse_selection;
use HaCleanup::snapshots::diff::diff_snapshot;
use HaCleanup::snapshots::{full_restore, plan_full_restore, restore_entities};
use HaCleanup::{CleanupConfig, RegistryStore};

use crate::cmd_diff::print_diff;
use crate::util;

/// Selective restore: bring back chosen entities from the snapshot's "deleted" bucket.
pub fn exec_selective(
    cfg: &CleanupConfig,
    snapshot: PathBuf,
    select: Option<String>,
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    util::dry_run_banner(dry_run);
    let snap = util::resolve_snapshot(cfg, &snapshot)?;
    let live = util::live_path_for(&snap)?;
    let mut store = RegistryStore::new();

    let diff = diff_snapshot(&mut store, &snap, &live)
        .with_context(|| format!("diff {} against {}", snap.display(), live.display()))?;
    let candidates = diff.deleted.clone();
    if candidates.is_empty() {
        println!("Nothing to restore: no entity in the snapshot is missing from the live registry");
        return Ok(());
    }
    print_diff(&diff);

    let mut op = TerminalOperator::new(yes);
    let selection = match select {
        Some(s) => parse_selection(&s, candidates.len()),
        None => op.select("Restore which deleted entities?", candidates.len()),
    };
    if selection.is_empty() {
        println!("Nothing selected");
        return Ok(());
    }

    if dry_run {
        let outcome = restore_entities(&mut store, &live, &candidates, &selection, true)?;
        println!("Would restore: {}", outcome.appended.join(", "));
        if !outcome.skipped.is_empty() {
            println!("Would skip (already present): {}", outcome.skipped.join(", "));
        }
        return Ok(());
    }

    if !op.confirm(&format!(
        "Restore {} entity(ies) into {}?",
        selection.len(),
        live.display()
    )) {
        println!("Aborted");
        return Ok(());
    }

    util::with_host_stopped_cli(cfg, &mut op, &mut store, |batch| {
        batch.run("selective restore", |s| {
            let outcome = restore_entities(s, &live, &candidates, &selection, false)?;
            println!("Restored {} entity(ies)", outcome.appended.len());
            if !outcome.skipped.is_empty() {
                println!("Skipped (already present): {}", outcome.skipped.join(", "));
            }
            if let Some(b) = &outcome.backup {
                println!("Backup: {}", b.display());
            }
            Ok(())
        });
    })?;
    Ok(())
}

/// Full restore: replace the live registry file with the snapshot.
pub fn exec_full(cfg: &CleanupConfig, snapshot: PathBuf, dry_run: bool, yes: bool) -> Result<()> {
    util::dry_run_banner(dry_run);
    let snap = util::resolve_snapshot(cfg, &snapshot)?;
    let live = util::live_path_for(&snap)?;
    let mut store = RegistryStore::new();

    let plan = plan_full_restore(&mut store, &snap, &live)?;
    println!("Snapshot: {} ({})", plan.snapshot_path.display(), plan.kind.as_str());
    println!(
        "Items: live {} -> snapshot {} (delta {:+})",
        plan.live_items,
        plan.snapshot_items,
        plan.delta()
    );
    if plan.needs_warning() {
        warn!(
            "WARNING: restoring changes the item count by {:.0}% ({} -> {})",
            plan.change_ratio() * 100.0,
            plan.live_items,
            plan.snapshot_items
        );
    }
    if dry_run {
        return Ok(());
    }

    let mut op = TerminalOperator::new(yes);
    if !op.confirm(&format!(
        "Replace {} with {}?",
        live.display(),
        snap.display()
    )) {
        println!("Aborted");
        return Ok(());
    }

    util::with_host_stopped_cli(cfg, &mut op, &mut store, |batch| {
        batch.run("full restore", |s| {
            let backup = full_restore(s, &plan)?;
            println!("Restored {}", live.display());
            if let Some(b) = backup {
                println!("Backup of previous file: {}", b.display());
            }
            Ok(())
        });
    })?;
    Ok(())
}
