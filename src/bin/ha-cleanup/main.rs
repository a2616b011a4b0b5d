use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_orphans;
mod cmd_duplicates;
mod cmd_deleted;
mod cmd_purge_db;
mod cmd_prune;
mod cmd_snapshots;
mod cmd_diff;
mod cmd_restore;
mod cmd_run;

fn init_logger() {
    // RUST_LOG=debug ha-cleanup ...
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    let cfg = util::load_config(cli.config)?;
    let yes = cli.yes;

    match cli.cmd {
        cli::Cmd::Orphans { dry_run } =>
            cmd_orphans::exec(&cfg, dry_run, yes),

        cli::Cmd::Duplicates { dry_run, select } =>
            cmd_duplicates::exec(&cfg, dry_run, select, yes),

        cli::Cmd::Deleted { dry_run } =>
            cmd_deleted::exec(&cfg, dry_run, yes),

        cli::Cmd::PurgeDb { dry_run, days } =>
            cmd_purge_db::exec(&cfg, dry_run, days, yes),

        cli::Cmd::PruneBackups { dry_run, days } =>
            cmd_prune::exec(&cfg, dry_run, days, yes),

        cli::Cmd::Snapshots =>
            cmd_snapshots::exec(&cfg),

        cli::Cmd::Diff { snapshot } =>
            cmd_diff::exec(&cfg, snapshot),

        cli::Cmd::Restore { snapshot, select, dry_run } =>
            cmd_restore::exec_selective(&cfg, snapshot, select, dry_run, yes),

        cli::Cmd::RestoreFull { snapshot, dry_run } =>
            cmd_restore::exec_full(&cfg, snapshot, dry_run, yes),

        cli::Cmd::Run { dry_run } =>
            cmd_run::exec(&cfg, dry_run, yes),
    }
}
