//! # Ingestion
//!
//! Upstream side of the daemon.
//!
//! Responsibilities:
//! - Own the vendor access token (`CredentialManager`)
//! - Fetch a time range as rate-limited slices (`SampleSource`)
//! - Convert units and derive missing metrics (`Enricher`)
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ingestion::{CredentialManager, SampleSource};
//!
//! let credentials = Arc::new(CredentialManager::new(api, &blueprint.api));
//! let source = SampleSource::new(credentials, &blueprint.source);
//!
//! let fetched = source.fetch(range, None).collect().await?;
//! println!("{} samples", fetched.batch.len());
//! ```

mod clock;
mod credentials;
pub mod enrich;
mod metrics;
mod slicing;
mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::CredentialManager;
pub use enrich::Enricher;
pub use crate::metrics::{IngestionMetrics, MetricsSnapshot};
pub use slicing::slices;
pub use source::{FetchedBatch, FetchedSlice, SampleFetch, SampleSource};
