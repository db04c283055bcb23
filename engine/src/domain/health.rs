//! Health check configuration, results, and per-process health state.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::{Result, SupervisorError};

/// Common fields shared by every health check variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckCommon {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for HealthCheckCommon {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
            timeout: Duration::from_millis(500),
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HealthCheck {
    ProcessExists {
        common: HealthCheckCommon,
    },
    CpuUsage {
        common: HealthCheckCommon,
        max_cpu_percent: f32,
        sustained_duration: Duration,
    },
    MemoryUsage {
        common: HealthCheckCommon,
        max_memory_mb: u64,
        max_memory_percent: Option<f32>,
    },
    HttpEndpoint {
        common: HealthCheckCommon,
        url: String,
        expected_status_code: u16,
        expected_response: Option<String>,
    },
    CustomScript {
        common: HealthCheckCommon,
        script_path: String,
        args: Vec<String>,
        working_directory: Option<String>,
        expected_exit_code: i32,
    },
}

impl HealthCheck {
    pub fn common(&self) -> &HealthCheckCommon {
        match self {
            Self::ProcessExists { common }
            | Self::CpuUsage { common, .. }
            | Self::MemoryUsage { common, .. }
            | Self::HttpEndpoint { common, .. }
            | Self::CustomScript { common, .. } => common,
        }
    }

    pub fn kind(&self) -> HealthCheckKind {
        match self {
            Self::ProcessExists { .. } => HealthCheckKind::ProcessExists,
            Self::CpuUsage { .. } => HealthCheckKind::CpuUsage,
            Self::MemoryUsage { .. } => HealthCheckKind::MemoryUsage,
            Self::HttpEndpoint { .. } => HealthCheckKind::HttpEndpoint,
            Self::CustomScript { .. } => HealthCheckKind::CustomScript,
        }
    }

    /// Validates configuration at installation time (spec.md §4.4).
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::CpuUsage {
                max_cpu_percent, ..
            } => {
                if !(0.0..=100.0).contains(max_cpu_percent) {
                    return Err(SupervisorError::SupervisionConfig(format!(
                        "cpuUsage.maxCpuPercent must be within [0, 100], got {}",
                        max_cpu_percent
                    )));
                }
            }
            Self::MemoryUsage { max_memory_mb, .. } => {
                if *max_memory_mb < 1 {
                    return Err(SupervisorError::SupervisionConfig(
                        "memoryUsage.maxMemoryMB must be >= 1".into(),
                    ));
                }
            }
            Self::HttpEndpoint { url, .. } => {
                reqwest::Url::parse(url).map_err(|e| {
                    SupervisorError::SupervisionConfig(format!("invalid httpEndpoint url: {e}"))
                })?;
            }
            Self::CustomScript { script_path, .. } => {
                if script_path.is_empty() {
                    return Err(SupervisorError::SupervisionConfig(
                        "customScript.scriptPath must not be empty".into(),
                    ));
                }
            }
            Self::ProcessExists { .. } => {}
        }
        let common = self.common();
        if common.interval.is_zero() {
            return Err(SupervisorError::SupervisionConfig(
                "health check interval must be >= 1s".into(),
            ));
        }
        if common.timeout < Duration::from_millis(100) {
            return Err(SupervisorError::SupervisionConfig(
                "health check timeout must be >= 100ms".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthCheckKind {
    ProcessExists,
    CpuUsage,
    MemoryUsage,
    HttpEndpoint,
    CustomScript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
    Timeout,
    Error,
}

impl HealthStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Unhealthy | Self::Timeout | Self::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub check_id: Uuid,
    pub registry_id: super::process::RegistryId,
    pub pid: u32,
    pub kind: HealthCheckKind,
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub attempt: u32,
    pub message: Option<String>,
    pub details: Option<Value>,
}

/// Overall health status for a supervised process, after hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallHealthStatus {
    Healthy,
    Unhealthy,
    Error,
    Unknown,
}

/// Bounded recent-result history, newest pushed at the back, oldest dropped
/// from the front once `cap` is exceeded (spec.md §4.6: cap at 1000).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> BoundedHistory<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap.min(64)),
            cap,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Newest-first view, capped at `limit`.
    pub fn newest_first(&self, limit: usize) -> Vec<&T> {
        self.items.iter().rev().take(limit).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessHealthState {
    pub overall_status: OverallHealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_health_checks: u64,
    pub total_failures: u64,
    pub last_known_good_state: Option<DateTime<Utc>>,
    pub recent_results: BoundedHistory<HealthCheckResult>,
    pub is_under_supervision: bool,
}

impl Default for ProcessHealthState {
    fn default() -> Self {
        Self {
            overall_status: OverallHealthStatus::Unknown,
            last_health_check: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_health_checks: 0,
            total_failures: 0,
            last_known_good_state: None,
            recent_results: BoundedHistory::new(1000),
            is_under_supervision: true,
        }
    }
}

/// Overall supervision posture, derived from the ratio of unhealthy
/// supervised processes and the restart-failure ratio (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemHealthLevel {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthSummary {
    pub level: SystemHealthLevel,
    pub supervised_count: usize,
    pub unhealthy_count: usize,
    pub restart_failure_ratio: f32,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl SystemHealthSummary {
    /// `critical` above half non-healthy, `degraded` above a quarter
    /// non-healthy or a restart-failure ratio over 0.5, else `healthy`.
    pub fn compute(
        supervised_count: usize,
        unhealthy_count: usize,
        restart_failure_ratio: f32,
    ) -> Self {
        let unhealthy_ratio = if supervised_count == 0 {
            0.0
        } else {
            unhealthy_count as f32 / supervised_count as f32
        };

        let mut issues = Vec::new();
        if unhealthy_count > 0 {
            issues.push(format!(
                "{unhealthy_count} of {supervised_count} supervised processes are not healthy"
            ));
        }
        if restart_failure_ratio > 0.5 {
            issues.push(format!(
                "restart failure ratio {restart_failure_ratio:.2} exceeds 0.5"
            ));
        }

        let level = if unhealthy_ratio > 0.5 {
            SystemHealthLevel::Critical
        } else if unhealthy_ratio > 0.25 || restart_failure_ratio > 0.5 {
            SystemHealthLevel::Degraded
        } else {
            SystemHealthLevel::Healthy
        };

        let recommendations = match level {
            SystemHealthLevel::Critical => vec![
                "investigate supervised processes failing health checks immediately".to_string(),
            ],
            SystemHealthLevel::Degraded => {
                vec!["review restart policies and recent health check failures".to_string()]
            }
            SystemHealthLevel::Healthy => Vec::new(),
        };

        Self {
            level,
            supervised_count,
            unhealthy_count,
            restart_failure_ratio,
            issues,
            recommendations,
        }
    }
}
