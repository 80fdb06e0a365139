//! Command implementations.

mod daemon;
mod info;
mod init_config;
mod once;
mod validate;

pub use daemon::run_daemon;
pub use info::{run_gateways, run_sensors};
pub use init_config::run_init_config;
pub use once::run_once;
pub use validate::run_validate;
