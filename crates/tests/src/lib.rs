//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 模拟 e2e 测试（MockVendorApi -> Scheduler -> Dispatcher，无需网络）
//! - 水位线与按后端补发的场景测试
//! - 凭据主动/被动刷新
//! - line protocol 往返测试

#[cfg(test)]
mod support;

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader, CONFIG_TEMPLATE};
    use contracts::ShutdownSignal;
    use dispatcher::{create_dispatcher, DispatcherConfig};

    /// The generated template must load and yield working sinks
    #[tokio::test]
    async fn test_template_builds_dry_run_dispatcher() {
        let blueprint = ConfigLoader::load_from_str(CONFIG_TEMPLATE, ConfigFormat::Toml).unwrap();
        let dispatcher = create_dispatcher(
            DispatcherConfig {
                backends: blueprint.backends.clone(),
                retry: blueprint.retry.clone(),
                dry_run: true,
                verbose: false,
            },
            ShutdownSignal::never(),
        )
        .unwrap();

        assert_eq!(dispatcher.sink_names().len(), blueprint.backends.len());
        dispatcher.shutdown().await;
    }
}

#[cfg(test)]
mod e2e_tests;

#[cfg(test)]
mod wire_tests;
