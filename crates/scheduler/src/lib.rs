//! # Scheduler
//!
//! 轮询调度模块。
//!
//! 负责：
//! - 计算下一次拉取的时间范围（水位线 + 回填 + 最大回溯）
//! - 执行 fetch -> dispatch -> 更新水位线 的周期
//! - 守护模式循环：间隔等待、指数退避、可中断的关闭
//! - 单次模式：有限次重试，失败返回错误
//! - 水位线持久化（JSON 文件 / 内存）
//!
//! ## 使用示例
//!
//! ```ignore
//! use scheduler::{FileWatermarkStore, GapTracker, Scheduler, SchedulerConfig};
//!
//! let store = FileWatermarkStore::open(&blueprint.daemon.state_path)?;
//! let tracker = GapTracker::new(Box::new(store), backlog, max_lookback);
//! let mut scheduler = Scheduler::new(
//!     source,
//!     dispatcher,
//!     tracker,
//!     SchedulerConfig::from_blueprint(&blueprint),
//!     shutdown.signal(),
//! );
//!
//! scheduler.run_daemon().await?;
//! scheduler.close().await;
//! ```

mod error;
mod gap_tracker;
mod scheduler;
mod store;

pub use error::SchedulerError;
pub use gap_tracker::GapTracker;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerState};
pub use store::{FileWatermarkStore, MemoryWatermarkStore};
