use anyhow::Result;

use HaCleanup::snapshots::scan_snapshots;
use HaCleanup::CleanupConfig;

pub fn exec(cfg: &CleanupConfig) -> Result<()> {
    let list = scan_snapshots(&cfg.storage_dir());
    if list.is_empty() {
        println!("No snapshots in {}", cfg.storage_dir().display());
        return Ok(());
    }
    println!(
        "{:>3}  {:<19}  {:<16}  {:>7}  {:>10}  name",
        "#", "timestamp", "kind", "items", "size"
    );
    for (i, s) in list.iter().enumerate() {
        let name = s.path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
        println!(
            "{:>3}  {:<19}{} {:<16}  {:>7}  {:>10}  {}",
            i + 1,
            s.timestamp.format("%Y-%m-%d %H:%M:%S"),
            if s.timestamp_from_name { " " } else { "*" },
            s.kind.as_str(),
            s.entity_count,
            s.size,
            name
        );
    }
    if list.iter().any(|s| !s.timestamp_from_name) {
        println!("(* timestamp taken from file mtime)");
    }
    Ok(())
}
