//! Supervisor configuration (spec.md §6): every tunable enumerated in the
//! external interface table, loadable from YAML via `serde_yaml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::AdapterSelection;
use crate::domain::{AutoRestartConfig, Result, SupervisorError};
use crate::sync::SyncConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    pub request_timeout: Duration,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolManagerConfig {
    pub default_health_check_interval: Duration,
    pub default_worker_failure_threshold: u32,
}

impl Default for PoolManagerConfig {
    fn default() -> Self {
        Self {
            default_health_check_interval: Duration::from_secs(15),
            default_worker_failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRetentionConfig {
    pub process_retention_days: u32,
    pub event_retention_days: u32,
    pub cleanup_interval: Duration,
}

impl Default for RegistryRetentionConfig {
    fn default() -> Self {
        Self {
            process_retention_days: 7,
            event_retention_days: 30,
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitoringConfig {
    pub global_interval: Duration,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthMonitoringConfig {
    fn default() -> Self {
        Self {
            global_interval: Duration::from_secs(10),
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Adapter sync cadence (ms), bounds `[100, 10000]`.
    pub refresh_interval: Duration,
    pub enable_process_tree: bool,
    pub monitor_system_metrics: bool,
    /// Metrics ring buffer size.
    pub buffer_size: usize,
    pub enable_auto_restart: bool,
    /// Max retained process snapshots and event cap basis.
    pub max_process_history: usize,
    pub platform_adapter: AdapterSelection,
    pub allow_mock_adapter_fallback: bool,

    pub enable_ipc: bool,
    pub ipc: IpcConfig,

    pub enable_pooling: bool,
    pub pools: PoolManagerConfig,

    pub registry_retention: RegistryRetentionConfig,
    pub health_monitoring: HealthMonitoringConfig,
    pub auto_restart_defaults: AutoRestartConfig,
    pub sync: SyncConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(2000),
            enable_process_tree: true,
            monitor_system_metrics: true,
            buffer_size: 300,
            enable_auto_restart: true,
            max_process_history: 1000,
            platform_adapter: AdapterSelection::Auto,
            allow_mock_adapter_fallback: true,
            enable_ipc: false,
            ipc: IpcConfig::default(),
            enable_pooling: false,
            pools: PoolManagerConfig::default(),
            registry_retention: RegistryRetentionConfig::default(),
            health_monitoring: HealthMonitoringConfig::default(),
            auto_restart_defaults: AutoRestartConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Eager validation (spec.md supplemental item C.5): catches
    /// out-of-bounds configuration before the Supervisor is constructed.
    pub fn validate(&self) -> Result<()> {
        let millis = self.refresh_interval.as_millis();
        if !(100..=10_000).contains(&millis) {
            return Err(SupervisorError::SupervisionConfig(format!(
                "refreshInterval must be within [100ms, 10000ms], got {millis}ms"
            )));
        }
        if self.buffer_size == 0 {
            return Err(SupervisorError::SupervisionConfig(
                "bufferSize must be > 0".into(),
            ));
        }
        if self.max_process_history == 0 {
            return Err(SupervisorError::SupervisionConfig(
                "maxProcessHistory must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(source)
            .map_err(|e| SupervisorError::SupervisionConfig(format!("invalid YAML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SupervisorConfig::default().validate().unwrap();
    }

    #[test]
    fn refresh_interval_below_bound_is_rejected() {
        let config = SupervisorConfig {
            refresh_interval: Duration::from_millis(10),
            ..SupervisorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_overrides_buffer_size_and_validates() {
        let mut base = serde_yaml::to_value(SupervisorConfig::default()).unwrap();
        base.as_mapping_mut()
            .unwrap()
            .insert("buffer_size".into(), 500.into());
        let yaml = serde_yaml::to_string(&base).unwrap();
        let config = SupervisorConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.buffer_size, 500);
    }

    #[test]
    fn yaml_with_out_of_bounds_refresh_interval_is_rejected() {
        let mut base = serde_yaml::to_value(SupervisorConfig::default()).unwrap();
        base.as_mapping_mut().unwrap().insert(
            "refresh_interval".into(),
            serde_yaml::to_value(Duration::from_millis(20)).unwrap(),
        );
        let yaml = serde_yaml::to_string(&base).unwrap();
        assert!(SupervisorConfig::from_yaml(&yaml).is_err());
    }
}
