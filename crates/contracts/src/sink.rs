//! BackendSink trait - Dispatcher output interface
//!
//! One implementation per backend kind, selected by configuration.

use crate::{Batch, ContractError};

/// What a successful write did with the batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Samples transmitted
    pub written: usize,
    /// Samples skipped as malformed
    pub dropped: usize,
}

/// Time-series backend write destination
///
/// Each sink is an independent failure domain and is driven by its own
/// worker task, so `&mut self` is never shared.
#[trait_variant::make(BackendSink: Send)]
pub trait LocalBackendSink {
    /// Backend name from configuration (used for logging/metrics/watermarks)
    fn name(&self) -> &str;

    /// Serialize and transmit a batch
    ///
    /// Malformed samples are dropped and counted in the report. Whole-batch
    /// failures are `BackendTransient` (network, timeout, 5xx) or
    /// `BackendPermanent` (4xx).
    async fn write(&mut self, batch: &Batch) -> Result<WriteReport, ContractError>;

    /// Release connections
    async fn close(&mut self) -> Result<(), ContractError>;
}
