//! 周期指标收集模块
//!
//! 基于 CycleOutcome 记录 Prometheus 指标，并在内存中聚合运行统计。

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{CycleOutcome, CycleStatus};
use metrics::{counter, gauge, histogram};
use tracing::{error, info, warn};

/// 记录一个周期的结果
///
/// 每个周期恰好调用一次：写指标并输出一条 `cycle complete` 日志。
///
/// # Example
///
/// ```ignore
/// let outcome = scheduler.run_once(range).await;
/// record_cycle_outcome(&outcome);
/// ```
pub fn record_cycle_outcome(outcome: &CycleOutcome) {
    let status = outcome.status.label();
    let elapsed_ms = outcome.elapsed.as_millis() as u64;

    counter!("sensorpushd_cycles_total", "status" => status).increment(1);
    histogram!("sensorpushd_cycle_duration_ms").record(elapsed_ms as f64);
    gauge!("sensorpushd_last_cycle_samples").set(outcome.samples as f64);

    let watermark = outcome.watermark.map(|w| w.to_rfc3339());
    match outcome.status {
        CycleStatus::Delivered => info!(
            cycle = outcome.cycle_id,
            range = %outcome.range,
            samples = outcome.samples,
            dropped = outcome.dropped,
            elapsed_ms,
            watermark = ?watermark,
            "cycle complete"
        ),
        CycleStatus::Partial => warn!(
            cycle = outcome.cycle_id,
            range = %outcome.range,
            samples = outcome.samples,
            dropped = outcome.dropped,
            failed = ?outcome.failed_backends(),
            error = outcome.error.as_deref().unwrap_or(""),
            elapsed_ms,
            watermark = ?watermark,
            "cycle complete"
        ),
        CycleStatus::SourceFailed => error!(
            cycle = outcome.cycle_id,
            range = %outcome.range,
            retryable = outcome.retryable,
            error = outcome.error.as_deref().unwrap_or(""),
            elapsed_ms,
            "cycle complete"
        ),
        CycleStatus::Cancelled => info!(
            cycle = outcome.cycle_id,
            range = %outcome.range,
            elapsed_ms,
            "cycle complete (cancelled)"
        ),
    }
}

/// 记录水位线落后当前时间的秒数
pub fn record_watermark_lag(scope: &str, lag_secs: f64) {
    gauge!(
        "sensorpushd_watermark_lag_seconds",
        "scope" => scope.to_string()
    )
    .set(lag_secs.max(0.0));
}

/// 记录一次退避等待
pub fn record_backoff(reason: &str, delay: Duration) {
    counter!(
        "sensorpushd_backoff_total",
        "reason" => reason.to_string()
    )
    .increment(1);
    histogram!("sensorpushd_backoff_delay_ms").record(delay.as_millis() as f64);
}

/// 周期指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct CycleStatsAggregator {
    /// 总周期数
    pub total_cycles: u64,

    /// 各状态周期数
    pub delivered: u64,
    pub partial: u64,
    pub source_failed: u64,
    pub cancelled: u64,

    /// 拉取的样本总数
    pub samples_fetched: u64,

    /// 丢弃的样本总数
    pub samples_dropped: u64,

    /// 周期耗时统计 (毫秒)
    pub duration_stats: RunningStats,

    /// 各后端失败次数
    pub backend_failures: BTreeMap<String, u64>,
}

impl CycleStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, outcome: &CycleOutcome) {
        self.total_cycles += 1;
        match outcome.status {
            CycleStatus::Delivered => self.delivered += 1,
            CycleStatus::Partial => self.partial += 1,
            CycleStatus::SourceFailed => self.source_failed += 1,
            CycleStatus::Cancelled => self.cancelled += 1,
        }
        self.samples_fetched += outcome.samples as u64;
        self.samples_dropped += outcome.dropped as u64;
        self.duration_stats
            .push(outcome.elapsed.as_secs_f64() * 1000.0);

        for name in outcome.failed_backends() {
            *self.backend_failures.entry(name.to_string()).or_insert(0) += 1;
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            total_cycles: self.total_cycles,
            delivered: self.delivered,
            partial: self.partial,
            source_failed: self.source_failed,
            cancelled: self.cancelled,
            samples_fetched: self.samples_fetched,
            samples_dropped: self.samples_dropped,
            success_rate: if self.total_cycles > 0 {
                self.delivered as f64 / self.total_cycles as f64 * 100.0
            } else {
                0.0
            },
            cycle_duration_ms: StatsSummary::from(&self.duration_stats),
            backend_failures: self.backend_failures.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub total_cycles: u64,
    pub delivered: u64,
    pub partial: u64,
    pub source_failed: u64,
    pub cancelled: u64,
    pub samples_fetched: u64,
    pub samples_dropped: u64,
    pub success_rate: f64,
    pub cycle_duration_ms: StatsSummary,
    pub backend_failures: BTreeMap<String, u64>,
}

impl std::fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Ingestion Summary ===")?;
        writeln!(
            f,
            "Cycles: {} ({:.2}% delivered)",
            self.total_cycles, self.success_rate
        )?;
        writeln!(
            f,
            "  delivered={} partial={} source_failed={} cancelled={}",
            self.delivered, self.partial, self.source_failed, self.cancelled
        )?;
        writeln!(f, "Samples fetched: {}", self.samples_fetched)?;
        writeln!(f, "Samples dropped: {}", self.samples_dropped)?;
        writeln!(f, "Cycle duration (ms): {}", self.cycle_duration_ms)?;

        if !self.backend_failures.is_empty() {
            writeln!(f, "Backend failures:")?;
            for (backend, count) in &self.backend_failures {
                writeln!(f, "  {}: {}", backend, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
