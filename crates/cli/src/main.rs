//! # sensorpushd
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载、环境变量覆盖与验证
//! - 守护模式 / 单次导入的组件编排
//! - 传感器与网关列表
//! - 优雅关闭处理 (Ctrl+C / SIGTERM)

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_daemon, run_gateways, run_init_config, run_once, run_sensors, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Held until exit so buffered file logs are flushed
    let _guard = observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: (cli.metrics_port != 0).then_some(cli.metrics_port),
        default_log_level: cli.default_log_level(),
        log_file: cli.log_file.clone(),
    })?;

    info!(version = env!("CARGO_PKG_VERSION"), "sensorpushd starting");

    let verbose = cli.verbose > 0;
    let result = match &cli.command {
        Commands::Daemon(args) => run_daemon(args, verbose).await,
        Commands::Once(args) => run_once(args, verbose).await,
        Commands::Sensors(args) => run_sensors(args).await,
        Commands::Gateways(args) => run_gateways(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::InitConfig(args) => run_init_config(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %format!("{e:#}"), "Command failed");
    }

    result
}
