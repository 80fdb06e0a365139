//! Pipeline orchestrator - loads the configuration and wires all components.

use std::path::Path;
use std::sync::Arc;

use config_loader::ConfigLoader;
use contracts::{DaemonBlueprint, SensorId, ShutdownSignal, Span, WatermarkStore};
use dispatcher::{create_dispatcher, select_backends, DispatcherConfig};
use ingestion::{CredentialManager, SampleSource};
use scheduler::{FileWatermarkStore, GapTracker, MemoryWatermarkStore, Scheduler, SchedulerConfig};
use tracing::{debug, info};
use vendor_client::SensorPushClient;

use crate::cli::ConfigArgs;
use crate::error::CliError;

/// Command-line values applied on top of the configuration file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub login: Option<String>,
    pub password: Option<String>,
    /// Comma separated sensor ids
    pub sensors: Option<String>,
    pub interval: Option<Span>,
    pub poll_backlog: Option<Span>,
    pub no_convert: bool,
    pub slice: Option<Span>,
    pub sample_limit: Option<u32>,
    pub request_delay: Option<Span>,
}

impl Overrides {
    /// Secret overrides only
    pub fn from_config_args(args: &ConfigArgs) -> Self {
        Self {
            login: args.login.clone(),
            password: args.password.clone(),
            ..Default::default()
        }
    }

    pub fn apply(&self, blueprint: &mut DaemonBlueprint) {
        if let Some(login) = &self.login {
            blueprint.api.login = login.clone();
        }
        if let Some(password) = &self.password {
            blueprint.api.password = password.clone();
        }
        if let Some(sensors) = &self.sensors {
            blueprint.source.sensors = SensorId::parse_list(sensors);
        }
        if let Some(interval) = self.interval {
            blueprint.daemon.interval = interval;
        }
        if let Some(backlog) = self.poll_backlog {
            blueprint.daemon.poll_backlog = backlog;
        }
        if self.no_convert {
            blueprint.source.convert_units = false;
        }
        if let Some(slice) = self.slice {
            blueprint.source.slice = slice;
        }
        if let Some(limit) = self.sample_limit {
            blueprint.source.sample_limit = limit;
        }
        if let Some(delay) = self.request_delay {
            blueprint.source.request_delay = delay;
        }
    }
}

/// Parse `path`, apply `overrides`, then validate the result
pub fn load_blueprint(path: &Path, overrides: &Overrides) -> Result<DaemonBlueprint, CliError> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }

    let mut blueprint = ConfigLoader::parse_path(path)?;
    overrides.apply(&mut blueprint);
    ConfigLoader::validate(&blueprint)?;

    info!(
        config = %path.display(),
        backends = blueprint.backends.len(),
        sensors = blueprint.source.sensors.len(),
        "Configuration loaded"
    );
    Ok(blueprint)
}

/// Vendor client, credentials and sample source for `blueprint`
pub fn sample_source(blueprint: &DaemonBlueprint) -> Result<SampleSource<SensorPushClient>, CliError> {
    let client = Arc::new(SensorPushClient::new(&blueprint.api)?);
    let credentials = Arc::new(CredentialManager::new(client, &blueprint.api));
    Ok(SampleSource::new(credentials, &blueprint.source))
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The validated configuration
    pub blueprint: DaemonBlueprint,
    /// `--backend` subset (empty = all)
    pub backends: Vec<String>,
    /// Log line protocol instead of sending it
    pub dry_run: bool,
    /// Log every dry-run line
    pub verbose: bool,
    /// Keep watermarks in `daemon.state_path` (otherwise in memory)
    pub persist_watermarks: bool,
    /// First range when no watermark exists
    pub backlog: Span,
}

/// Build a scheduler with every component wired
pub fn build_scheduler(
    config: &PipelineConfig,
    shutdown: ShutdownSignal,
) -> Result<Scheduler<SensorPushClient>, CliError> {
    let blueprint = &config.blueprint;
    let source = sample_source(blueprint)?;

    let backends = select_backends(&blueprint.backends, &config.backends)?;
    let dispatcher = create_dispatcher(
        DispatcherConfig {
            backends,
            retry: blueprint.retry.clone(),
            dry_run: config.dry_run,
            verbose: config.verbose,
        },
        shutdown.clone(),
    )?;

    let store: Box<dyn WatermarkStore> = if config.persist_watermarks {
        let store = FileWatermarkStore::open(&blueprint.daemon.state_path)?;
        debug!(path = %store.path().display(), "watermark store opened");
        Box::new(store)
    } else {
        debug!("watermarks kept in memory");
        Box::new(MemoryWatermarkStore::new())
    };
    let tracker = GapTracker::new(
        store,
        config.backlog.as_chrono(),
        blueprint.daemon.max_lookback.as_chrono(),
    );

    Ok(Scheduler::new(
        source,
        dispatcher,
        tracker,
        SchedulerConfig::from_blueprint(blueprint),
        shutdown,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
[api]
login = "me@example.com"
password = ""

[[backends]]
name = "vm"
kind = "victoriametrics"
url = "http://localhost:8428"

[[backends]]
name = "influx"
kind = "influxdb2"
url = "http://localhost:8086"
token = "tok"
org = "home"
bucket = "sensors"
"#;

    fn config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_blueprint(Path::new("/nonexistent/sensorpushd.toml"), &Overrides::default())
            .unwrap_err();
        assert!(matches!(err, CliError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_password_override_satisfies_validation() {
        let file = config_file();

        let err = load_blueprint(file.path(), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("api.password"), "got: {err}");

        let overrides = Overrides {
            password: Some("from-env".into()),
            ..Default::default()
        };
        let blueprint = load_blueprint(file.path(), &overrides).unwrap();
        assert_eq!(blueprint.api.password, "from-env");
    }

    #[test]
    fn test_overrides_patch_source_and_daemon() {
        let file = config_file();
        let overrides = Overrides {
            password: Some("pw".into()),
            sensors: Some("b, a,a".into()),
            interval: Some(Span::from_mins(1)),
            no_convert: true,
            sample_limit: Some(500),
            ..Default::default()
        };
        let blueprint = load_blueprint(file.path(), &overrides).unwrap();

        assert_eq!(blueprint.source.sensors, vec![SensorId::from("a"), SensorId::from("b")]);
        assert_eq!(blueprint.daemon.interval, Span::from_mins(1));
        assert!(!blueprint.source.convert_units);
        assert_eq!(blueprint.source.sample_limit, 500);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let file = config_file();
        let overrides = Overrides {
            password: Some("pw".into()),
            slice: Some(Span::from_secs(0)),
            ..Default::default()
        };
        assert!(load_blueprint(file.path(), &overrides).is_err());
    }

    #[tokio::test]
    async fn test_unknown_backend_fails_build() {
        let file = config_file();
        let overrides = Overrides {
            password: Some("pw".into()),
            ..Default::default()
        };
        let config = PipelineConfig {
            blueprint: load_blueprint(file.path(), &overrides).unwrap(),
            backends: vec!["nope".into()],
            dry_run: true,
            verbose: false,
            persist_watermarks: false,
            backlog: Span::from_mins(10),
        };

        let err = build_scheduler(&config, ShutdownSignal::never()).err().unwrap();
        assert!(err.to_string().contains("unknown backend 'nope'"), "got: {err}");
    }
}
