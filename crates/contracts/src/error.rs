//! Layered error definitions
//!
//! Categorized by source: config / source (vendor API) / auth / backend / state

use std::time::Duration;

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Source Errors =====
    /// Vendor API unreachable, timed out or answered 5xx
    #[error("sample source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// Vendor API answered 429
    #[error("sample source rate limited (retry after {retry_after:?})")]
    SourceRateLimited { retry_after: Option<Duration> },

    /// Vendor API refused the request (4xx other than an expired token)
    #[error("sample source rejected request ({status}): {message}")]
    SourceRejected { status: u16, message: String },

    // ===== Auth Errors =====
    /// Token expired or revoked (HTTP 401)
    #[error("access token expired or rejected")]
    AuthExpired,

    /// Obtaining a fresh token failed
    #[error("credential refresh failed: {message}")]
    CredentialRefresh { message: String },

    // ===== Backend Errors =====
    /// Network failure, timeout or 5xx on a backend write
    #[error("backend '{sink_name}' transient error: {message}")]
    BackendTransient { sink_name: String, message: String },

    /// Backend refused the batch, resubmission would fail again
    #[error("backend '{sink_name}' permanent error: {message}")]
    BackendPermanent { sink_name: String, message: String },

    /// A single sample cannot be encoded safely
    #[error("malformed sample from sensor '{sensor_id}': {message}")]
    MalformedSample { sensor_id: String, message: String },

    // ===== State Errors =====
    /// Watermark store read/write failure
    #[error("watermark store error: {message}")]
    WatermarkStore { message: String },

    /// Operation interrupted by shutdown
    #[error("cancelled by shutdown")]
    Cancelled,

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    pub fn source_rejected(status: u16, message: impl Into<String>) -> Self {
        Self::SourceRejected {
            status,
            message: message.into(),
        }
    }

    pub fn credential_refresh(message: impl Into<String>) -> Self {
        Self::CredentialRefresh {
            message: message.into(),
        }
    }

    /// Create transient backend error
    pub fn backend_transient(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendTransient {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create permanent backend error
    pub fn backend_permanent(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendPermanent {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    pub fn malformed_sample(sensor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedSample {
            sensor_id: sensor_id.into(),
            message: message.into(),
        }
    }

    pub fn watermark_store(message: impl Into<String>) -> Self {
        Self::WatermarkStore {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation later can succeed.
    ///
    /// `AuthExpired` is not transient on its own: the caller refreshes the
    /// credential once and only then decides.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::SourceRateLimited { .. }
                | Self::CredentialRefresh { .. }
                | Self::BackendTransient { .. }
                | Self::WatermarkStore { .. }
                | Self::Io(_)
        )
    }

    /// Server-provided hint for rate limiting, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::SourceRateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } | Self::ConfigValidation { .. } => "config",
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::SourceRateLimited { .. } => "rate_limited",
            Self::SourceRejected { .. } => "source_rejected",
            Self::AuthExpired => "auth_expired",
            Self::CredentialRefresh { .. } => "credential_refresh",
            Self::BackendTransient { .. } => "backend_transient",
            Self::BackendPermanent { .. } => "backend_permanent",
            Self::MalformedSample { .. } => "malformed_sample",
            Self::WatermarkStore { .. } => "watermark_store",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}
