//! # Dispatcher
//!
//! 数据分发模块。
//!
//! 负责：
//! - 把同一个 `Batch` 编码为 line protocol，写入所有配置的后端
//! - 每个后端一个独立 worker，慢或失败的后端不阻塞其他后端
//! - 周期内对瞬时错误做有限次重试，并为每个后端给出一个 `SinkOutcome`
//! - dry-run 模式下只记录将要写入的行

mod dispatcher;
mod error;
mod handle;
pub mod line_protocol;
mod metrics;
mod sinks;

pub use crate::metrics::{MetricsSnapshot, SinkMetrics};
pub use dispatcher::{
    create_dispatcher, select_backends, Dispatcher, DispatcherBuilder, DispatcherConfig,
};
pub use error::DispatcherError;
pub use handle::{SinkHandle, SinkOptions};
pub use sinks::{classify_status, DryRunSink, LineProtocolSink, MAX_LINES_PER_REQUEST, PREVIEW_LINES};
