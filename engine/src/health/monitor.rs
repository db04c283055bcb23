//! Health Monitor (spec.md §4.6): glues checks and restarts to the registry.
//!
//! The monitor is a pure reader of the registry plus its own per-process
//! bookkeeping; it never mutates `RegistryProcess` directly. Transitions to
//! non-healthy are surfaced to the caller as `HealthTransition`s, which the
//! Supervisor facade forwards to the Auto-Restart Engine — avoiding a direct
//! dependency cycle between the two (spec.md §9, design note).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::{
    HealthCheck, HealthStatus, OverallHealthStatus, ProcessHealthState, RegistryId, Result,
    SupervisorError,
};
use crate::health::checks::{HealthCheckEngine, SustainedBreach};
use crate::ports::PlatformAdapter;
use crate::registry::ProcessRegistry;

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub global_interval: Duration,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            global_interval: Duration::from_secs(10),
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        }
    }
}

struct Supervised {
    checks: Vec<HealthCheck>,
    state: ProcessHealthState,
    breaches: Vec<SustainedBreach>,
}

/// One supervised process transitioning `overallStatus`, reported so the
/// caller can dispatch to the Auto-Restart Engine.
#[derive(Debug, Clone)]
pub struct HealthTransition {
    pub registry_id: RegistryId,
    pub new_status: OverallHealthStatus,
    pub reasons: Vec<String>,
}

pub struct HealthMonitor {
    registry: Arc<ProcessRegistry>,
    adapter: Arc<dyn PlatformAdapter>,
    engine: HealthCheckEngine,
    config: HealthMonitorConfig,
    supervised: Mutex<HashMap<RegistryId, Supervised>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        adapter: Arc<dyn PlatformAdapter>,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            registry,
            adapter,
            engine: HealthCheckEngine::new(),
            config,
            supervised: Mutex::new(HashMap::new()),
        }
    }

    /// Installs `checks` for `registry_id`, validating each eagerly
    /// (spec.md §4.4 / supplemental item C.5).
    pub fn supervise(&self, registry_id: RegistryId, checks: Vec<HealthCheck>) -> Result<()> {
        for check in &checks {
            check.validate()?;
        }
        let breaches = checks.iter().map(|_| SustainedBreach::default()).collect();
        self.supervised.lock().unwrap().insert(
            registry_id,
            Supervised {
                checks,
                state: ProcessHealthState::default(),
                breaches,
            },
        );
        Ok(())
    }

    pub fn stop_supervising(&self, registry_id: RegistryId) {
        self.supervised.lock().unwrap().remove(&registry_id);
    }

    pub fn is_supervised(&self, registry_id: RegistryId) -> bool {
        self.supervised.lock().unwrap().contains_key(&registry_id)
    }

    pub fn health_state(&self, registry_id: RegistryId) -> Option<ProcessHealthState> {
        self.supervised
            .lock()
            .unwrap()
            .get(&registry_id)
            .map(|s| s.state.clone())
    }

    /// Every currently supervised registry id, for system-wide health
    /// summaries.
    pub fn supervised_ids(&self) -> Vec<RegistryId> {
        self.supervised.lock().unwrap().keys().copied().collect()
    }

    /// Runs every installed check for `registry_id` immediately, outside the
    /// global tick cadence (`triggerHealthCheck`).
    pub async fn trigger_check(&self, registry_id: RegistryId) -> Result<OverallHealthStatus> {
        let process = self
            .registry
            .get(registry_id)
            .ok_or_else(|| SupervisorError::ProcessNotFound(registry_id.to_string()))?;

        let (checks, mut breaches) = {
            let supervised = self.supervised.lock().unwrap();
            let entry = supervised
                .get(&registry_id)
                .ok_or_else(|| SupervisorError::HealthCheckError("not supervised".into()))?;
            (entry.checks.clone(), entry.breaches.clone())
        };

        let mut results = Vec::with_capacity(checks.len());
        for (check, breach) in checks.iter().zip(breaches.iter_mut()) {
            if !check.common().enabled {
                continue;
            }
            let result = self
                .engine
                .run(registry_id, &process.info, check, self.adapter.as_ref(), 0, Some(breach))
                .await;
            results.push(result);
        }

        let tick_status = aggregate_tick_status(&results);
        let now = Utc::now();

        let mut supervised = self.supervised.lock().unwrap();
        if let Some(entry) = supervised.get_mut(&registry_id) {
            entry.breaches = breaches;
            for result in results {
                entry.state.total_health_checks += 1;
                if result.status.is_failure() {
                    entry.state.total_failures += 1;
                }
                entry.state.recent_results.push(result);
            }
            apply_hysteresis(&mut entry.state, tick_status, now, &self.config);
            Ok(entry.state.overall_status)
        } else {
            Ok(OverallHealthStatus::Unknown)
        }
    }

    /// One global tick across every supervised process (spec.md §4.6).
    /// Returns the set of processes whose `overallStatus` changed this tick.
    pub async fn tick(&self) -> Vec<HealthTransition> {
        let registry_ids: Vec<RegistryId> = self.supervised.lock().unwrap().keys().copied().collect();
        let mut transitions = Vec::new();

        for registry_id in registry_ids {
            let process = match self.registry.get(registry_id) {
                Some(p) => p,
                None => {
                    self.stop_supervising(registry_id);
                    continue;
                }
            };

            let (checks, mut breaches) = {
                let supervised = self.supervised.lock().unwrap();
                match supervised.get(&registry_id) {
                    Some(s) => (s.checks.clone(), s.breaches.clone()),
                    None => continue,
                }
            };

            let mut results = Vec::with_capacity(checks.len());
            for (check, breach) in checks.iter().zip(breaches.iter_mut()) {
                if !check.common().enabled {
                    continue;
                }
                let result = self
                    .engine
                    .run(registry_id, &process.info, check, self.adapter.as_ref(), 0, Some(breach))
                    .await;
                results.push(result);
            }

            let tick_status = aggregate_tick_status(&results);
            let now = Utc::now();
            let reasons: Vec<String> = results.iter().filter_map(|r| r.message.clone()).collect();

            let mut supervised = self.supervised.lock().unwrap();
            let Some(entry) = supervised.get_mut(&registry_id) else {
                continue;
            };
            entry.breaches = breaches;
            let previous_status = entry.state.overall_status;
            for result in results {
                entry.state.total_health_checks += 1;
                if result.status.is_failure() {
                    entry.state.total_failures += 1;
                }
                entry.state.recent_results.push(result);
            }
            apply_hysteresis(&mut entry.state, tick_status, now, &self.config);

            if entry.state.overall_status != previous_status {
                info!(
                    %registry_id,
                    from = ?previous_status,
                    to = ?entry.state.overall_status,
                    "health status transitioned"
                );
                transitions.push(HealthTransition {
                    registry_id,
                    new_status: entry.state.overall_status,
                    reasons: reasons.clone(),
                });
            }
        }

        if !transitions.is_empty() {
            warn!(count = transitions.len(), "health monitor tick produced transitions");
        }
        transitions
    }
}

/// Step 3 of spec.md §4.6: any error -> error; any unhealthy/timeout ->
/// unhealthy; all healthy -> healthy; otherwise unknown.
fn aggregate_tick_status(results: &[crate::domain::HealthCheckResult]) -> HealthStatus {
    if results.is_empty() {
        return HealthStatus::Unknown;
    }
    if results.iter().any(|r| r.status == HealthStatus::Error) {
        return HealthStatus::Error;
    }
    if results
        .iter()
        .any(|r| matches!(r.status, HealthStatus::Unhealthy | HealthStatus::Timeout))
    {
        return HealthStatus::Unhealthy;
    }
    if results.iter().all(|r| r.status == HealthStatus::Healthy) {
        return HealthStatus::Healthy;
    }
    HealthStatus::Unknown
}

fn apply_hysteresis(
    state: &mut ProcessHealthState,
    tick_status: HealthStatus,
    now: chrono::DateTime<Utc>,
    config: &HealthMonitorConfig,
) {
    state.last_health_check = Some(now);
    match tick_status {
        HealthStatus::Healthy => {
            state.consecutive_successes += 1;
            state.consecutive_failures = 0;
            if state.consecutive_successes >= config.healthy_threshold {
                state.overall_status = OverallHealthStatus::Healthy;
                state.last_known_good_state = Some(now);
            }
        }
        HealthStatus::Error => {
            state.consecutive_failures += 1;
            state.consecutive_successes = 0;
            if state.consecutive_failures >= config.unhealthy_threshold {
                state.overall_status = OverallHealthStatus::Error;
            }
        }
        HealthStatus::Unhealthy | HealthStatus::Timeout => {
            state.consecutive_failures += 1;
            state.consecutive_successes = 0;
            if state.consecutive_failures >= config.unhealthy_threshold {
                state.overall_status = OverallHealthStatus::Unhealthy;
            }
        }
        HealthStatus::Unknown => {
            state.consecutive_failures = 0;
            state.consecutive_successes = 0;
        }
    }
}
