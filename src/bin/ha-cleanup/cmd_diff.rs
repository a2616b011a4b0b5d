use anyhow::{Context, Result};
use std::path::PathBuf;

use HaCleanup::registry::doc::Entity;
use HaCleanup::snapshots::diff::diff_snapshot;
use HaCleanup::snapshots::RegistryDiff;
use HaCleanup::{CleanupConfig, RegistryStore};

use crate::util;

fn label(v: &serde_json::Value) -> String {
    match Entity::from_value(v) {
        Some(e) => {
            let name = e.display_name();
            if name.is_empty() {
                format!("{} [{}]", e.entity_id, e.platform)
            } else {
                format!("{} [{}] {}", e.entity_id, e.platform, name)
            }
        }
        None => v.to_string(),
    }
}

pub fn print_diff(diff: &RegistryDiff) {
    println!("Deleted since snapshot ({}):", diff.deleted.len());
    for (i, v) in diff.deleted.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, label(v));
    }
    println!("New since snapshot ({}):", diff.added.len());
    for v in &diff.added {
        println!("       {}", label(v));
    }
    println!("Modified ({}):", diff.modified.len());
    for m in &diff.modified {
        println!("       {}", m.entity_id);
        for c in &m.changes {
            println!(
                "           {}: {} -> {}",
                c.field,
                util::fmt_opt(c.before.as_ref()),
                util::fmt_opt(c.after.as_ref())
            );
        }
    }
}

pub fn exec(cfg: &CleanupConfig, snapshot: PathBuf) -> Result<()> {
    let snap = util::resolve_snapshot(cfg, &snapshot)?;
    let live = util::live_path_for(&snap)?;
    let mut store = RegistryStore::new();
    let diff = diff_snapshot(&mut store, &snap, &live)
        .with_context(|| format!("diff {} against {}", snap.display(), live.display()))?;
    if diff.is_empty() {
        println!("No differences");
        return Ok(());
    }
    print_diff(&diff);
    Ok(())
}
