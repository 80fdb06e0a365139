//! 配置校验模块
//!
//! 校验规则：
//! - API 凭据与地址合法
//! - token 安全余量小于 token 有效期
//! - 采样、调度、重试参数为正且在范围内
//! - 至少一个后端，后端名称唯一
//! - 各后端类型的必填字段齐全

use std::collections::HashSet;

use contracts::{BackendConfig, BackendKind, ContractError, DaemonBlueprint};

/// 校验 DaemonBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    validate_api(blueprint)?;
    validate_source(blueprint)?;
    validate_daemon(blueprint)?;
    validate_retry(blueprint)?;
    validate_backends(blueprint)?;
    Ok(())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// 校验 API 配置
fn validate_api(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    let api = &blueprint.api;

    if api.login.trim().is_empty() {
        return Err(ContractError::config_validation(
            "api.login",
            "login cannot be empty",
        ));
    }
    if api.password.is_empty() {
        return Err(ContractError::config_validation(
            "api.password",
            "password cannot be empty",
        ));
    }
    if !is_http_url(&api.base_url) {
        return Err(ContractError::config_validation(
            "api.base_url",
            format!("must start with http:// or https://, got '{}'", api.base_url),
        ));
    }
    if api.token_safety_margin >= api.token_ttl {
        return Err(ContractError::config_validation(
            "api.token_safety_margin",
            format!(
                "token_safety_margin ({}) must be < token_ttl ({})",
                api.token_safety_margin, api.token_ttl
            ),
        ));
    }
    if api.timeout.is_zero() {
        return Err(ContractError::config_validation(
            "api.timeout",
            "timeout must be > 0",
        ));
    }
    Ok(())
}

/// 校验采样配置
fn validate_source(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    let source = &blueprint.source;

    if source.measurement_name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "source.measurement_name",
            "measurement_name cannot be empty",
        ));
    }
    if source.measurement_name.contains(['\n', '\r']) {
        return Err(ContractError::config_validation(
            "source.measurement_name",
            "measurement_name cannot contain line breaks",
        ));
    }
    if !source.altitude_m.is_finite() {
        return Err(ContractError::config_validation(
            "source.altitude_m",
            "altitude_m must be a finite number",
        ));
    }
    if source.slice.as_duration().as_secs() < 60 {
        return Err(ContractError::config_validation(
            "source.slice",
            format!("slice must be at least 1m, got {}", source.slice),
        ));
    }
    if source.sample_limit == 0 {
        return Err(ContractError::config_validation(
            "source.sample_limit",
            "sample_limit must be > 0",
        ));
    }
    Ok(())
}

/// 校验调度配置
fn validate_daemon(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    let daemon = &blueprint.daemon;

    if daemon.interval.is_zero() {
        return Err(ContractError::config_validation(
            "daemon.interval",
            "interval must be > 0",
        ));
    }
    if daemon.max_lookback.is_zero() {
        return Err(ContractError::config_validation(
            "daemon.max_lookback",
            "max_lookback must be > 0",
        ));
    }
    if daemon.poll_backlog > daemon.max_lookback {
        return Err(ContractError::config_validation(
            "daemon.poll_backlog / daemon.max_lookback",
            format!(
                "poll_backlog ({}) must be <= max_lookback ({})",
                daemon.poll_backlog, daemon.max_lookback
            ),
        ));
    }
    if daemon.state_path.trim().is_empty() {
        return Err(ContractError::config_validation(
            "daemon.state_path",
            "state_path cannot be empty",
        ));
    }
    Ok(())
}

/// 校验重试配置
fn validate_retry(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    let retry = &blueprint.retry;

    if !(0.0..=1.0).contains(&retry.jitter) {
        return Err(ContractError::config_validation(
            "retry.jitter",
            format!("jitter must be within 0.0..=1.0, got {}", retry.jitter),
        ));
    }
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        return Err(ContractError::config_validation(
            "retry.multiplier",
            format!("multiplier must be >= 1.0, got {}", retry.multiplier),
        ));
    }
    if retry.base_delay > retry.max_delay {
        return Err(ContractError::config_validation(
            "retry.base_delay / retry.max_delay",
            format!(
                "base_delay ({}) must be <= max_delay ({})",
                retry.base_delay, retry.max_delay
            ),
        ));
    }
    if retry.oneshot_attempts == 0 {
        return Err(ContractError::config_validation(
            "retry.oneshot_attempts",
            "oneshot_attempts must be >= 1",
        ));
    }
    if retry.sink_attempts == 0 {
        return Err(ContractError::config_validation(
            "retry.sink_attempts",
            "sink_attempts must be >= 1",
        ));
    }
    Ok(())
}

/// 校验后端配置
fn validate_backends(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    if blueprint.backends.is_empty() {
        return Err(ContractError::config_validation(
            "backends",
            "at least one backend must be configured",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, backend) in blueprint.backends.iter().enumerate() {
        if backend.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("backends[{idx}].name"),
                "backend name cannot be empty",
            ));
        }
        // '/' separates the backend part of a watermark key
        if backend.name.contains('/') {
            return Err(ContractError::config_validation(
                format!("backends[{idx}].name"),
                format!("backend name '{}' cannot contain '/'", backend.name),
            ));
        }
        if !seen.insert(backend.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("backends[name={}]", backend.name),
                "duplicate backend name",
            ));
        }
        validate_backend(idx, backend)?;
    }

    if !blueprint.backends.iter().any(|b| b.required) {
        return Err(ContractError::config_validation(
            "backends",
            "at least one backend must be required",
        ));
    }
    Ok(())
}

fn validate_backend(idx: usize, backend: &BackendConfig) -> Result<(), ContractError> {
    if !is_http_url(&backend.url) {
        return Err(ContractError::config_validation(
            format!("backends[{idx}].url"),
            format!("must start with http:// or https://, got '{}'", backend.url),
        ));
    }
    if backend.timeout.is_zero() {
        return Err(ContractError::config_validation(
            format!("backends[{idx}].timeout"),
            "timeout must be > 0",
        ));
    }

    let require = |value: &Option<String>, field: &str| -> Result<(), ContractError> {
        match value {
            Some(v) if !v.trim().is_empty() => Ok(()),
            _ => Err(ContractError::config_validation(
                format!("backends[{idx}].{field}"),
                format!("{field} is required for {} backends", backend.kind),
            )),
        }
    };

    match backend.kind {
        BackendKind::InfluxDb2 => {
            require(&backend.token, "token")?;
            require(&backend.org, "org")?;
            require(&backend.bucket, "bucket")?;
        }
        BackendKind::InfluxDb3 => {
            require(&backend.token, "token")?;
            require(&backend.database, "database")?;
        }
        BackendKind::VictoriaMetrics => {}
    }
    Ok(())
}
