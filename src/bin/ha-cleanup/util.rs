use anyhow::{Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};

use HaCleanup::host::{with_host_stopped, Batch, BatchReport, CommandHost};
use HaCleanup::metrics;
use HaCleanup::prompt::Operator;
use HaCleanup::registry::MtimeCache;
use HaCleanup::{CleanupConfig, RegistryStore};

pub fn load_config(explicit: Option<PathBuf>) -> Result<CleanupConfig> {
    let cfg = CleanupConfig::from_env(explicit).context("resolve Home Assistant config dir")?;
    info!("Config path: {}", cfg.config_dir.display());
    log::debug!("{}", cfg);
    Ok(cfg)
}

/// Snapshot argument: as given if it exists, else relative to `.storage/`.
pub fn resolve_snapshot(cfg: &CleanupConfig, arg: &Path) -> Result<PathBuf> {
    if arg.exists() {
        return Ok(arg.to_path_buf());
    }
    let in_storage = cfg.storage_dir().join(arg);
    if in_storage.exists() {
        return Ok(in_storage);
    }
    anyhow::bail!("snapshot {} not found", arg.display())
}

/// Live registry a snapshot was taken from (`<dir>/<name before .backup.>`).
pub fn live_path_for(snapshot: &Path) -> Result<PathBuf> {
    let name = snapshot
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("bad snapshot path {}", snapshot.display()))?;
    let (source, _) = HaCleanup::snapshots::split_snapshot_name(name)
        .with_context(|| format!("{} is not a snapshot name (<file>.backup.<ts>)", name))?;
    Ok(snapshot.with_file_name(source))
}

/// Run `body` with Home Assistant stopped, then print what failed and whether it came back.
pub fn with_host_stopped_cli<F>(
    cfg: &CleanupConfig,
    operator: &mut dyn Operator,
    store: &mut RegistryStore<MtimeCache>,
    body: F,
) -> Result<BatchReport>
where
    F: FnOnce(&mut Batch<'_, MtimeCache>),
{
    let mut host = CommandHost::new(cfg.process_timeout);
    let report = with_host_stopped(&mut host, operator, cfg.settle_delay, store, body)?;

    for (name, err) in &report.failed {
        println!("FAILED: {}: {}", name, err);
    }
    match report.restarted {
        Some(true) => {}
        Some(false) => warn!("Home Assistant did not start; start it manually"),
        None => println!("Please start Home Assistant manually."),
    }
    Ok(report)
}

pub fn print_metrics() {
    for line in metrics::snapshot().summary_lines() {
        println!("  {}", line);
    }
}

pub fn dry_run_banner(dry_run: bool) {
    if dry_run {
        println!("(dry run: nothing will be changed)");
    }
}

pub fn fmt_opt(v: Option<&serde_json::Value>) -> String {
    match v {
        None => "<absent>".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
