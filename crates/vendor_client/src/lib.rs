//! # Vendor Client
//!
//! SensorPush cloud API access.
//!
//! Responsibilities:
//! - Implement `contracts::VendorApi` over HTTPS (`SensorPushClient`)
//! - Map HTTP failures onto the source error taxonomy
//! - Provide an in-memory `MockVendorApi` with failure injection for tests

pub mod http_client;
pub mod mock_client;
mod wire;

pub use contracts::VendorApi;
pub use http_client::{classify_status, SensorPushClient};
pub use mock_client::{MockFailure, MockVendorApi};
