use anyhow::Result;

use HaCleanup::cleanup::clear_deleted_items;
use HaCleanup::prompt::{Operator, TerminalOperator};
use HaCleanup::{CleanupConfig, RegistryStore};

use crate::util;

pub fn exec(cfg: &CleanupConfig, dry_run: bool, yes: bool) -> Result<()> {
    util::dry_run_banner(dry_run);
    let mut store = RegistryStore::new();
    let preview = clear_deleted_items(&mut store, cfg, true)?;
    println!(
        "deleted_entities: {}, deleted_devices: {}",
        preview.deleted_entities, preview.deleted_devices
    );
    if preview.total() == 0 || dry_run {
        return Ok(());
    }

    let mut op = TerminalOperator::new(yes);
    if !op.confirm(&format!(
        "Clear {} deleted entity and {} deleted device record(s)?",
        preview.deleted_entities, preview.deleted_devices
    )) {
        println!("Aborted");
        return Ok(());
    }

    util::with_host_stopped_cli(cfg, &mut op, &mut store, |batch| {
        if let Some(r) = batch.run("deleted items", |s| Ok(clear_deleted_items(s, cfg, false)?)) {
            println!("Cleared {} deleted registry item(s)", r.total());
        }
    })?;
    Ok(())
}
