//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the ingestion daemon.
//! Business crates depend on this crate only; reverse dependencies are
//! prohibited.
//!
//! ## Time Model
//! - All instants are `chrono::DateTime<Utc>`
//! - Backends receive nanosecond Unix timestamps
//! - A watermark never lies in the future

mod blueprint;
mod error;
mod outcome;
mod retry;
mod sample;
mod sensor_id;
mod shutdown;
mod sink;
mod span;
mod vendor;
mod watermark;

pub use blueprint::*;
pub use error::*;
pub use outcome::*;
pub use retry::RetryPolicy;
pub use sample::*;
pub use sensor_id::SensorId;
pub use shutdown::{Shutdown, ShutdownSignal};
pub use sink::*;
pub use span::Span;
pub use vendor::*;
pub use watermark::*;
