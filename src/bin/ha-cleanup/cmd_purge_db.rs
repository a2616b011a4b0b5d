use anyhow::Result;
use std::time::SystemTime;

use HaCleanup::prompt::{Operator, TerminalOperator};
use HaCleanup::recorder::{db_size_mb, purge_database, purge_keep_days};
use HaCleanup::{CleanupConfig, RegistryStore};

use crate::util;

pub fn exec(cfg: &CleanupConfig, dry_run: bool, days: Option<u64>, yes: bool) -> Result<()> {
    util::dry_run_banner(dry_run);
    let db = cfg.recorder_db();
    let mut store = RegistryStore::new();
    let days = match days {
        Some(d) => d,
        None => purge_keep_days(cfg, &mut store).0,
    };

    let before = db_size_mb(&db);
    let Some(preview) = purge_database(&db, days, SystemTime::now(), true)? else {
        println!("No database found, skipping");
        return Ok(());
    };
    println!("Database size: {:.1} MB", before);
    println!(
        "{} states, {} events older than {} days",
        preview.states, preview.events, days
    );
    if preview.is_empty() || dry_run {
        return Ok(());
    }

    let mut op = TerminalOperator::new(yes);
    if !op.confirm(&format!(
        "Delete {} states and {} events from {}?",
        preview.states,
        preview.events,
        db.display()
    )) {
        println!("Aborted");
        return Ok(());
    }

    util::with_host_stopped_cli(cfg, &mut op, &mut store, |batch| {
        batch.run("recorder purge", |_| Ok(purge_database(&db, days, SystemTime::now(), false)?));
    })?;

    let after = db_size_mb(&db);
    println!(
        "Database: {:.1} MB -> {:.1} MB ({:.1} MB saved)",
        before,
        after,
        before - after
    );
    Ok(())
}
