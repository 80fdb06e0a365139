//! `once` command implementation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use contracts::{Shutdown, Span, TimeRange};
use tracing::{info, warn};

use crate::cli::OnceArgs;
use crate::error::CliError;
use crate::pipeline::{
    build_scheduler, install_signal_handlers, load_blueprint, Overrides, PipelineConfig,
    PipelineStats,
};

/// Execute the `once` command
pub async fn run_once(args: &OnceArgs, verbose: bool) -> Result<()> {
    let overrides = Overrides {
        sensors: args.sensors.clone(),
        no_convert: args.no_convert,
        slice: args.slice,
        sample_limit: args.query_limit,
        request_delay: args.delay,
        ..Overrides::from_config_args(&args.config)
    };
    let blueprint = load_blueprint(&args.config.config, &overrides)?;
    let backlog = args.backlog.unwrap_or(blueprint.daemon.oneshot_backlog);
    let range = resolve_range(args.start, args.stop, backlog, Utc::now())?;

    info!(
        start = %range.start,
        stop = %range.end,
        dry_run = args.dry_run,
        "Importing range"
    );

    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    install_signal_handlers(shutdown);

    let config = PipelineConfig {
        blueprint,
        backends: args.backends.clone(),
        dry_run: args.dry_run,
        verbose,
        persist_watermarks: false,
        backlog,
    };
    let mut scheduler = build_scheduler(&config, signal).context("Failed to start import")?;

    let result = scheduler.run_oneshot(range).await;

    let stats = PipelineStats::collect(&scheduler);
    scheduler.close().await;
    stats.print_summary();

    match result {
        Ok(outcome) => {
            info!(
                samples = outcome.samples,
                dropped = outcome.dropped,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Import complete"
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            warn!("Import interrupted by shutdown signal");
            Ok(())
        }
        Err(e) => Err(CliError::from(e)).context("Import failed"),
    }
}

/// Range from `--start`/`--stop`, or `backlog` back from the stop time
fn resolve_range(
    start: Option<DateTime<Utc>>,
    stop: Option<DateTime<Utc>>,
    backlog: Span,
    now: DateTime<Utc>,
) -> Result<TimeRange, CliError> {
    let stop = stop.unwrap_or(now);
    let start = start.unwrap_or_else(|| stop - backlog.as_chrono());
    if start > stop {
        return Err(CliError::InvalidRange {
            start: start.to_rfc3339(),
            stop: stop.to_rfc3339(),
        });
    }
    Ok(TimeRange::new(start, stop))
}
