//! Management configuration and per-process management state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::health::HealthStatus;
use super::process::RegistryId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementConfig {
    pub auto_restart: bool,
    pub max_restarts: u32,
    pub restart_delay: Duration,
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,
    pub graceful_shutdown_timeout: Duration,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            auto_restart: false,
            max_restarts: 3,
            restart_delay: Duration::from_secs(1),
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
            graceful_shutdown_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedProcess {
    pub registry_id: RegistryId,
    pub config: ManagementConfig,
    pub restart_count: u32,
    pub last_restart_time: Option<DateTime<Utc>>,
    pub is_healthy: bool,
    pub last_health_check: Option<DateTime<Utc>>,
    pub health_check_failures: u32,
}

impl ManagedProcess {
    pub fn new(registry_id: RegistryId, config: ManagementConfig) -> Self {
        Self {
            registry_id,
            config,
            restart_count: 0,
            last_restart_time: None,
            is_healthy: true,
            last_health_check: None,
            health_check_failures: 0,
        }
    }

    pub fn record_health(&mut self, status: HealthStatus, when: DateTime<Utc>) {
        self.last_health_check = Some(when);
        match status {
            HealthStatus::Healthy => {
                self.is_healthy = true;
                self.health_check_failures = 0;
            }
            _ => {
                self.is_healthy = false;
                self.health_check_failures += 1;
            }
        }
    }
}
