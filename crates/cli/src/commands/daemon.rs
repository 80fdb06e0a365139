//! `daemon` command implementation.

use anyhow::{Context, Result};
use contracts::Shutdown;
use tracing::info;

use crate::cli::DaemonArgs;
use crate::pipeline::{
    build_scheduler, install_signal_handlers, load_blueprint, Overrides, PipelineConfig,
    PipelineStats,
};

/// Execute the `daemon` command
pub async fn run_daemon(args: &DaemonArgs, verbose: bool) -> Result<()> {
    let overrides = Overrides {
        sensors: args.sensors.clone(),
        interval: args.interval,
        poll_backlog: args.backlog,
        ..Overrides::from_config_args(&args.config)
    };
    let blueprint = load_blueprint(&args.config.config, &overrides)?;
    let backlog = blueprint.daemon.poll_backlog;

    if args.dry_run {
        info!("Dry run mode - line protocol is logged, watermarks are not persisted");
    }

    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    install_signal_handlers(shutdown);

    let config = PipelineConfig {
        blueprint,
        backends: args.backends.clone(),
        dry_run: args.dry_run,
        verbose,
        persist_watermarks: !args.dry_run,
        backlog,
    };
    let mut scheduler = build_scheduler(&config, signal).context("Failed to start daemon")?;

    let result = scheduler.run_daemon().await;

    let stats = PipelineStats::collect(&scheduler);
    scheduler.close().await;

    info!(
        cycles = stats.cycles.total_cycles,
        samples_written = stats.samples_written(),
        "sensorpushd stopped"
    );
    stats.print_summary();

    result.context("Daemon loop failed")
}
