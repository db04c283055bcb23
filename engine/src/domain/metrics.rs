//! System metrics snapshot and history aggregation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    /// Overall CPU utilization, percent in [0, 100].
    pub cpu_percent: f32,
    /// Per-core CPU utilization, percent in [0, 100].
    pub cpu_per_core: Vec<f32>,
    pub load_average_1: f64,
    pub load_average_5: f64,
    pub load_average_15: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub disk_read_bytes_per_sec: u64,
    pub disk_write_bytes_per_sec: u64,
    pub disk_utilization_percent: f32,
}

impl SystemMetrics {
    pub fn memory_percent(&self) -> f32 {
        if self.memory_total == 0 {
            0.0
        } else {
            (self.memory_used as f64 / self.memory_total as f64 * 100.0) as f32
        }
    }
}

/// Aggregate min/max/avg over a sample window (`getAggregatedMetrics`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub sample_count: usize,
    pub cpu_min: f32,
    pub cpu_max: f32,
    pub cpu_avg: f32,
    pub memory_min_percent: f32,
    pub memory_max_percent: f32,
    pub memory_avg_percent: f32,
    pub disk_read_bytes_total: u64,
    pub disk_write_bytes_total: u64,
}
