//! `init-config` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use config_loader::CONFIG_TEMPLATE;
use tracing::info;

use crate::cli::InitConfigArgs;
use crate::error::CliError;

/// Execute the `init-config` command
pub fn run_init_config(args: &InitConfigArgs) -> Result<()> {
    if args.output == Path::new("-") {
        print!("{}", CONFIG_TEMPLATE);
        return Ok(());
    }

    write_template(&args.output, args.force)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(path = %args.output.display(), "Configuration template written");
    println!(
        "Wrote {} - fill in [api] credentials and [[backends]], then run `sensorpushd validate -c {}`",
        args.output.display(),
        args.output.display()
    );
    Ok(())
}

fn write_template(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::output_exists(path.display().to_string()));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, CONFIG_TEMPLATE)?;
    Ok(())
}
