use anyhow::Result;
use std::collections::HashSet;
use std::time::SystemTime;

use HaCleanup::cleanup::{clear_deleted_items, remove_orphans};
use HaCleanup::orphans::{detect_orphans, Orphan};
use HaCleanup::prompt::{Operator, TerminalOperator};
use HaCleanup::recorder::{db_size_mb, purge_database, purge_keep_days};
use HaCleanup::snapshots::prune_snapshots;
use HaCleanup::{CleanupConfig, RegistryStore};

use crate::cmd_orphans::print_orphans;
use crate::cmd_prune::retention;
use crate::util;

pub fn exec(cfg: &CleanupConfig, dry_run: bool, yes: bool) -> Result<()> {
    println!("==================================================");
    println!("Home Assistant Cleanup{}", if dry_run { " (DRY RUN)" } else { "" });
    println!("==================================================");

    let db = cfg.recorder_db();
    let db_before = db_size_mb(&db);
    if db_before > 0.0 {
        println!("Database size: {:.1} MB", db_before);
    }

    let mut store = RegistryStore::new();

    // ----- обнаружение (одинаково для dry-run и боевого прогона) -----
    let orphans = detect_orphans(&mut store, cfg);
    print_orphans(&orphans);
    let deleted = clear_deleted_items(&mut store, cfg, true).unwrap_or_else(|e| {
        log::warn!("deleted items preview failed: {}", e);
        Default::default()
    });
    let (days, _) = purge_keep_days(cfg, &mut store);
    let purge = match purge_database(&db, days, SystemTime::now(), true) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("recorder preview failed: {}", e);
            None
        }
    };
    let keep = retention(cfg.backup_retention_days);
    let old_snapshots = prune_snapshots(&cfg.storage_dir(), keep, SystemTime::now(), true);

    println!("Plan:");
    println!("  orphaned entities:       {}", orphans.len());
    println!("  deleted registry items:  {}", deleted.total());
    match &purge {
        Some(p) => println!(
            "  recorder rows:           {} states, {} events (> {} days)",
            p.states, p.events, days
        ),
        None => println!("  recorder rows:           - (no database)"),
    }
    println!(
        "  old snapshots:           {} (> {} days)",
        old_snapshots.removed_count(),
        cfg.backup_retention_days
    );
    if dry_run {
        return Ok(());
    }

    let mut op = TerminalOperator::new(yes);
    if !op.confirm(&format!(
        "Remove {} orphans, clear {} deleted items, purge recorder data older than {} days and snapshots older than {} days?",
        orphans.len(),
        deleted.total(),
        days,
        cfg.backup_retention_days
    )) {
        println!("Aborted");
        return Ok(());
    }

    let confirmed: HashSet<String> = orphans.into_iter().map(|(o, _)| o.entity_id).collect();
    let entity_registry = cfg.entity_registry();

    let mut shared_snapshot = None;
    let report = util::with_host_stopped_cli(cfg, &mut op, &mut store, |batch| {
        let removal = batch.run("orphan cleanup", |s| {
            let still: Vec<Orphan> = detect_orphans(s, cfg)
                .into_iter()
                .map(|(o, _)| o)
                .filter(|o| confirmed.contains(&o.entity_id))
                .collect();
            Ok(remove_orphans(s, &entity_registry, &still, false)?)
        });
        let cleared = batch.run("deleted items", |s| Ok(clear_deleted_items(s, cfg, false)?));
        // обе записи в одну секунду → второй снапшот не создан
        if let (Some(backup), Some(cleared)) = (removal.and_then(|r| r.backup), cleared) {
            if cleared.reuses_snapshot(&backup) {
                shared_snapshot = Some(backup);
            }
        }
        batch.run("recorder purge", |_| {
            Ok(purge_database(&db, days, SystemTime::now(), false)?)
        });
        batch.run("snapshot retention", |_| {
            let r = prune_snapshots(&cfg.storage_dir(), keep, SystemTime::now(), false);
            if r.failed > 0 {
                anyhow::bail!("{} snapshot(s) could not be removed", r.failed);
            }
            Ok(r)
        });
    })?;

    let db_after = db_size_mb(&db);
    println!("==================================================");
    println!("Summary:");
    util::print_metrics();
    if let Some(p) = &shared_snapshot {
        println!(
            "  note: {} covers both orphan cleanup and deleted items (state before orphan cleanup)",
            p.display()
        );
    }
    if db_before > 0.0 {
        println!(
            "  database: {:.1} MB -> {:.1} MB ({:.1} MB saved)",
            db_before,
            db_after,
            db_before - db_after
        );
    }
    if report.all_ok() {
        println!("  steps: {} ok", report.succeeded.len());
    } else {
        println!(
            "  steps: {} ok, {} failed (see log)",
            report.succeeded.len(),
            report.failed.len()
        );
    }
    println!("==================================================");
    Ok(())
}
