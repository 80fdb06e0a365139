//! Sink implementations
//!
//! Contains LineProtocolSink (HTTP) and DryRunSink.

mod http;
mod log;

pub use self::http::{classify_status, LineProtocolSink, MAX_LINES_PER_REQUEST};
pub use self::log::{DryRunSink, PREVIEW_LINES};
