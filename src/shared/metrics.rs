//! Prometheus Metrics Module
//!
//! 结算核心的监控指标
//!
//! ## 指标类型
//! - **Counter**: 入站事件、分发错误、入队成交、转账、结算结果、条件单
//! - **Histogram**: 单笔 Matches 结算耗时
//! - **Gauge**: 各钱包队列深度
//!
//! ## 使用示例
//! ```rust,ignore
//! use dex_settlement::shared::metrics::METRICS;
//!
//! METRICS.events_total.with_label_values(&["NEW_ORDER"]).inc();
//!
//! let timer = METRICS.settlement_duration.with_label_values(&[queue]).start_timer();
//! // ... 执行结算 ...
//! timer.observe_duration();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    /// 全局Metrics实例
    pub static ref METRICS: Metrics = Metrics::new();
}

/// 结算核心指标
pub struct Metrics {
    /// 入站事件总数 (按事件类型)
    pub events_total: CounterVec,

    /// 分发阶段被丢弃的事件 (decode / unknown_pair / orderbook)
    pub dispatch_errors_total: CounterVec,

    /// 成功入队的 Matches (按队列)
    pub matches_queued_total: CounterVec,

    /// 背压拒绝次数
    pub queue_full_total: CounterVec,

    /// 队列深度 (选择队列时采样)
    pub queue_depth: GaugeVec,

    /// 链上转账 (success / failed)
    pub transfers_total: CounterVec,

    /// 结算结果 (按 OperatorMessage 类型)
    pub settlements_total: CounterVec,

    /// 单笔 Matches 结算耗时 (秒)
    pub settlement_duration: HistogramVec,

    /// 条件单处理 (submitted / failed)
    pub stop_orders_total: CounterVec,
}

impl Metrics {
    /// 创建新的Metrics实例
    pub fn new() -> Self {
        Self {
            events_total: register_counter_vec!(
                "settlement_events_total",
                "Total number of inbound events received",
                &["event_type"]
            )
            .unwrap(),

            dispatch_errors_total: register_counter_vec!(
                "settlement_dispatch_errors_total",
                "Inbound events dropped by the dispatch engine",
                &["error_type"]
            )
            .unwrap(),

            matches_queued_total: register_counter_vec!(
                "settlement_matches_queued_total",
                "Matches accepted onto a settlement queue",
                &["queue"]
            )
            .unwrap(),

            queue_full_total: register_counter_vec!(
                "settlement_queue_full_total",
                "Matches rejected because every settlement queue was saturated",
                &["reason"]
            )
            .unwrap(),

            queue_depth: register_gauge_vec!(
                "settlement_queue_depth",
                "Pending matches per settlement queue",
                &["queue"]
            )
            .unwrap(),

            transfers_total: register_counter_vec!(
                "settlement_transfers_total",
                "On-chain token transfers attempted",
                &["status"]
            )
            .unwrap(),

            settlements_total: register_counter_vec!(
                "settlement_outcomes_total",
                "Settlement outcomes published",
                &["outcome"]
            )
            .unwrap(),

            settlement_duration: register_histogram_vec!(
                "settlement_duration_seconds",
                "Time spent executing one Matches",
                &["queue"],
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
            )
            .unwrap(),

            stop_orders_total: register_counter_vec!(
                "settlement_stop_orders_total",
                "Triggered stop orders by cascade result",
                &["status"]
            )
            .unwrap(),
        }
    }

    /// 导出Prometheus格式的指标
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
