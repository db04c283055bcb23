//! Auto-restart policy configuration and restart attempt records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::process::RegistryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    Never,
    OnFailure,
    Always,
    UnlessStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    Immediate,
    Linear,
    Exponential,
    Fixed,
}

/// The failure signal that triggered a restart policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartReason {
    Exit,
    Crash,
    HealthCheckFailure,
    Manual,
}

impl std::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Exit => "exit",
            Self::Crash => "crash",
            Self::HealthCheckFailure => "health_check_failure",
            Self::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRestartConfig {
    pub policy: RestartPolicy,
    pub strategy: BackoffStrategy,
    pub max_restarts: u32,
    pub time_window: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub health_check_grace_period: Duration,
    pub restart_on_health_check_failure: bool,
    pub restart_on_process_exit: bool,
    pub restart_on_crash: bool,
}

impl Default for AutoRestartConfig {
    fn default() -> Self {
        Self {
            policy: RestartPolicy::OnFailure,
            strategy: BackoffStrategy::Exponential,
            max_restarts: 5,
            time_window: Duration::from_secs(60),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            health_check_grace_period: Duration::from_secs(5),
            restart_on_health_check_failure: true,
            restart_on_process_exit: true,
            restart_on_crash: true,
        }
    }
}

impl AutoRestartConfig {
    /// Computes the delay before the `restart_count`-th restart (0-indexed),
    /// per the backoff strategy table in spec.md §4.5.
    pub fn delay_for(&self, restart_count: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Immediate => Duration::ZERO,
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear => {
                self.initial_delay + Duration::from_millis(1000) * restart_count
            }
            BackoffStrategy::Exponential => {
                let scaled =
                    self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(restart_count as i32);
                let capped = scaled.min(self.max_delay.as_secs_f64()).max(0.0);
                Duration::from_secs_f64(capped)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartAttempt {
    pub attempt_id: Uuid,
    pub registry_id: RegistryId,
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
    pub reason: RestartReason,
    pub success: bool,
    pub new_pid: Option<u32>,
    pub duration: Duration,
    pub error: Option<String>,
}
