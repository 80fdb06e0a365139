//! `sensors` and `gateways` command implementations.

use anyhow::{Context, Result};
use contracts::{GatewayInfo, SensorInfo};
use tracing::info;

use crate::cli::ListArgs;
use crate::pipeline::{load_blueprint, sample_source, Overrides};

/// Execute the `sensors` command
pub async fn run_sensors(args: &ListArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config.config, &Overrides::from_config_args(&args.config))?;
    let source = sample_source(&blueprint)?;

    let sensors = source.sensors().await.context("Failed to list sensors")?;
    info!(count = sensors.len(), "Sensors listed");

    if args.json {
        let json = serde_json::to_string_pretty(&sensors).context("Failed to serialize sensors")?;
        println!("{}", json);
    } else {
        print_sensors(&sensors);
    }
    Ok(())
}

/// Execute the `gateways` command
pub async fn run_gateways(args: &ListArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config.config, &Overrides::from_config_args(&args.config))?;
    let source = sample_source(&blueprint)?;

    let gateways = source.gateways().await.context("Failed to list gateways")?;
    info!(count = gateways.len(), "Gateways listed");

    if args.json {
        let json =
            serde_json::to_string_pretty(&gateways).context("Failed to serialize gateways")?;
        println!("{}", json);
    } else {
        print_gateways(&gateways);
    }
    Ok(())
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "-".to_string(), ToString::to_string)
}

fn print_sensors(sensors: &[SensorInfo]) {
    println!("\n=== Sensors ({}) ===\n", sensors.len());
    println!(
        "{:<26} {:<24} {:>7} {:>8} {:>7}",
        "ID", "NAME", "ACTIVE", "BATTERY", "RSSI"
    );
    for sensor in sensors {
        println!(
            "{:<26} {:<24} {:>7} {:>8} {:>7}",
            sensor.id.as_str(),
            sensor.name,
            if sensor.active { "yes" } else { "no" },
            optional(&sensor.battery_voltage),
            optional(&sensor.rssi)
        );
    }
    println!();
}

fn print_gateways(gateways: &[GatewayInfo]) {
    println!("\n=== Gateways ({}) ===\n", gateways.len());
    for gateway in gateways {
        println!("  - {}", gateway.name);
        println!("      id: {}", optional(&gateway.id));
        println!("      last seen: {}", optional(&gateway.last_seen));
        println!("      version: {}", optional(&gateway.version));
        if let Some(message) = &gateway.message {
            println!("      message: {}", message);
        }
    }
    println!();
}
