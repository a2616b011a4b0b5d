use anyhow::Result;
use std::collections::HashSet;

use HaCleanup::cleanup::remove_orphans;
use HaCleanup::orphans::{detect_orphans, Orphan, OrphanReason};
use HaCleanup::prompt::{Operator, TerminalOperator};
use HaCleanup::{CleanupConfig, RegistryStore};

use crate::util;

pub fn print_orphans(found: &[(Orphan, OrphanReason)]) {
    let mut last_cat = "";
    for (o, reason) in found {
        if o.category != last_cat {
            println!("[{}]", o.category);
            last_cat = &o.category;
        }
        let name = if o.name.is_empty() { "-" } else { o.name.as_str() };
        println!("  {:<50} {:<30} ({})", o.entity_id, name, reason.as_str());
    }
}

pub fn exec(cfg: &CleanupConfig, dry_run: bool, yes: bool) -> Result<()> {
    util::dry_run_banner(dry_run);
    let mut store = RegistryStore::new();
    let found = detect_orphans(&mut store, cfg);
    if found.is_empty() {
        println!("No orphaned entities found");
        return Ok(());
    }
    print_orphans(&found);
    println!("{} orphaned entity(ies)", found.len());
    if dry_run {
        return Ok(());
    }

    let path = cfg.entity_registry();
    let mut op = TerminalOperator::new(yes);
    if !op.confirm(&format!(
        "Remove {} orphaned entity(ies) from {}?",
        found.len(),
        path.display()
    )) {
        println!("Aborted");
        return Ok(());
    }

    let confirmed: HashSet<String> = found.into_iter().map(|(o, _)| o.entity_id).collect();
    util::with_host_stopped_cli(cfg, &mut op, &mut store, |batch| {
        batch.run("orphan cleanup", |s| {
            // состояние могло измениться, пока HA останавливался
            let still: Vec<Orphan> = detect_orphans(s, cfg)
                .into_iter()
                .map(|(o, _)| o)
                .filter(|o| confirmed.contains(&o.entity_id))
                .collect();
            let removal = remove_orphans(s, &path, &still, false)?;
            println!("Removed {} orphaned entity(ies)", removal.removed);
            if let Some(b) = &removal.backup {
                println!("Backup: {}", b.display());
            }
            Ok(())
        });
    })?;
    Ok(())
}
