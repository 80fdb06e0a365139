//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::DaemonBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::pipeline::{load_blueprint, Overrides};

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    base_url: String,
    interval: String,
    state_path: String,
    sensor_filter: Vec<String>,
    backends: Vec<BackendSummary>,
}

#[derive(Serialize)]
struct BackendSummary {
    name: String,
    kind: String,
    url: String,
    required: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.config.display().to_string();

    match load_blueprint(&args.config.config, &Overrides::from_config_args(&args.config)) {
        Ok(blueprint) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&blueprint),
            summary: Some(summarize(&blueprint)),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

fn summarize(blueprint: &DaemonBlueprint) -> ConfigSummary {
    ConfigSummary {
        version: format!("{:?}", blueprint.version),
        base_url: blueprint.api.base_url.clone(),
        interval: blueprint.daemon.interval.to_string(),
        state_path: blueprint.daemon.state_path.clone(),
        sensor_filter: blueprint
            .source
            .sensors
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
        backends: blueprint
            .backends
            .iter()
            .map(|b| BackendSummary {
                name: b.name.clone(),
                kind: b.kind.to_string(),
                url: b.url.clone(),
                required: b.required,
            })
            .collect(),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &DaemonBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.backends.iter().all(|b| !b.required) {
        warnings.push(
            "No backend is required - the global watermark advances even when every write fails"
                .to_string(),
        );
    }

    for backend in &blueprint.backends {
        if !backend.verify_tls {
            warnings.push(format!(
                "Backend '{}' does not verify TLS certificates",
                backend.name
            ));
        }
    }

    if !blueprint.api.verify_tls {
        warnings.push("api.verify_tls is false - vendor certificates are not checked".to_string());
    }

    if blueprint.source.request_delay.is_zero() {
        warnings.push(
            "source.request_delay is 0 - large backfills may be rate limited by the vendor"
                .to_string(),
        );
    }

    if blueprint.daemon.interval < blueprint.daemon.shutdown_grace {
        warnings.push(format!(
            "daemon.shutdown_grace ({}) exceeds daemon.interval ({})",
            blueprint.daemon.shutdown_grace, blueprint.daemon.interval
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  API: {}", summary.base_url);
            println!("  Interval: {}", summary.interval);
            println!("  State file: {}", summary.state_path);
            if summary.sensor_filter.is_empty() {
                println!("  Sensors: all");
            } else {
                println!("  Sensors: {}", summary.sensor_filter.join(", "));
            }
            println!("  Backends ({}):", summary.backends.len());
            for backend in &summary.backends {
                println!(
                    "    - {} ({}) {}{}",
                    backend.name,
                    backend.kind,
                    backend.url,
                    if backend.required { "" } else { " [optional]" }
                );
            }
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
