use anyhow::Result;

use HaCleanup::cleanup::apply_renames;
use HaCleanup::prompt::{Operator, TerminalOperator};
use HaCleanup::selection::parse_selection;
use HaCleanup::suffix::{find_suffix_collisions, SuffixCollision};
use HaCleanup::{CleanupConfig, CleanupError, RegistryStore};

use crate::util;

pub fn exec(cfg: &CleanupConfig, dry_run: bool, select: Option<String>, yes: bool) -> Result<()> {
    util::dry_run_banner(dry_run);
    let path = cfg.entity_registry();
    let mut store = RegistryStore::new();
    let doc = match store.load(&path) {
        Ok(d) => d,
        Err(e @ (CleanupError::NotFound(_) | CleanupError::InvalidFormat { .. })) => {
            log::warn!("duplicates: {}", e);
            println!("No suffix collisions found");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let found = find_suffix_collisions(&doc);
    if found.is_empty() {
        println!("No suffix collisions found");
        return Ok(());
    }
    println!("Entities with a numeric suffix whose base id is free:");
    for (i, c) in found.iter().enumerate() {
        println!("  {:>3}. [{}] {} -> {}", i + 1, c.category, c.old_id, c.base_id);
    }
    println!("Note: a trailing number is often part of the real name; pick only true duplicates.");

    let mut op = TerminalOperator::new(yes);
    let selection = match select {
        Some(s) => parse_selection(&s, found.len()),
        None if dry_run => return Ok(()),
        None => op.select("Rename which?", found.len()),
    };
    let picked: Vec<&SuffixCollision> = selection.pick(&found);
    if picked.is_empty() {
        println!("Nothing selected");
        return Ok(());
    }

    if dry_run {
        let outcome = apply_renames(&mut store, &path, &picked, true)?;
        for (old, new) in &outcome.renamed {
            println!("Would rename {} -> {}", old, new);
        }
        for id in &outcome.skipped {
            println!("Would skip {}", id);
        }
        return Ok(());
    }

    if !op.confirm(&format!(
        "Rename {} entity id(s) in {}?",
        picked.len(),
        path.display()
    )) {
        println!("Aborted");
        return Ok(());
    }

    util::with_host_stopped_cli(cfg, &mut op, &mut store, |batch| {
        batch.run("rename", |s| {
            let outcome = apply_renames(s, &path, &picked, false)?;
            for (old, new) in &outcome.renamed {
                println!("Renamed {} -> {}", old, new);
            }
            for id in &outcome.skipped {
                println!("Skipped {}", id);
            }
            Ok(())
        });
    })?;
    Ok(())
}
