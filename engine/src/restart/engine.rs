//! Auto-Restart Engine (spec.md §4.5): policy decision, rate limiting,
//! backoff, and single-flight restart execution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    AutoRestartConfig, ProcessStatus, RegistryId, RestartAttempt, RestartPolicy, RestartReason,
    Result, SupervisorError,
};
use crate::ports::PlatformAdapter;
use crate::registry::ProcessRegistry;

struct RestartState {
    config: AutoRestartConfig,
    attempts: Vec<DateTime<Utc>>,
    restart_count: u32,
    manually_stopped_at: Option<DateTime<Utc>>,
    in_progress: bool,
}

impl RestartState {
    fn new(config: AutoRestartConfig) -> Self {
        Self {
            config,
            attempts: Vec::new(),
            restart_count: 0,
            manually_stopped_at: None,
            in_progress: false,
        }
    }
}

pub struct AutoRestartEngine {
    registry: Arc<ProcessRegistry>,
    adapter: Arc<dyn PlatformAdapter>,
    states: Mutex<HashMap<RegistryId, RestartState>>,
    total_attempts: AtomicU64,
    total_failures: AtomicU64,
}

impl AutoRestartEngine {
    pub fn new(registry: Arc<ProcessRegistry>, adapter: Arc<dyn PlatformAdapter>) -> Self {
        Self {
            registry,
            adapter,
            states: Mutex::new(HashMap::new()),
            total_attempts: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    /// Failed attempts over total attempts across every supervised process,
    /// used by the system health summary (spec.md §4.6).
    pub fn global_failure_ratio(&self) -> f32 {
        let total = self.total_attempts.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.total_failures.load(Ordering::Relaxed) as f32 / total as f32
    }

    pub fn install(&self, registry_id: RegistryId, config: AutoRestartConfig) {
        self.states
            .lock()
            .unwrap()
            .insert(registry_id, RestartState::new(config));
    }

    pub fn remove(&self, registry_id: RegistryId) {
        self.states.lock().unwrap().remove(&registry_id);
    }

    pub fn mark_manually_stopped(&self, registry_id: RegistryId) {
        if let Some(state) = self.states.lock().unwrap().get_mut(&registry_id) {
            state.manually_stopped_at = Some(Utc::now());
        }
    }

    pub fn clear_manual_stop(&self, registry_id: RegistryId) {
        if let Some(state) = self.states.lock().unwrap().get_mut(&registry_id) {
            state.manually_stopped_at = None;
        }
    }

    pub fn reset_restart_state(&self, registry_id: RegistryId) {
        if let Some(state) = self.states.lock().unwrap().get_mut(&registry_id) {
            state.attempts.clear();
            state.restart_count = 0;
        }
    }

    pub fn restart_count(&self, registry_id: RegistryId) -> u32 {
        self.states
            .lock()
            .unwrap()
            .get(&registry_id)
            .map(|s| s.restart_count)
            .unwrap_or(0)
    }

    /// Evaluates policy for `reason` and performs the restart (after any
    /// backoff delay). Honors rate limiting and single-flight.
    pub async fn handle_failure(
        &self,
        registry_id: RegistryId,
        reason: RestartReason,
    ) -> Result<Option<RestartAttempt>> {
        let decision = self.decide(registry_id, reason)?;
        let Some(delay) = decision else {
            return Ok(None);
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.execute_restart(registry_id, reason).await.map(Some)
    }

    /// `manualRestart`: bypasses policy and rate limits, still single-flight.
    /// `execute_restart` itself performs the single-flight guard.
    pub async fn manual_restart(&self, registry_id: RegistryId) -> Result<RestartAttempt> {
        self.execute_restart(registry_id, RestartReason::Manual).await
    }

    /// Steps 1-4 of spec.md §4.5. Returns `Some(delay)` if a restart should
    /// proceed (possibly after `delay`), `None` if policy/rate limiting
    /// skips it.
    fn decide(&self, registry_id: RegistryId, reason: RestartReason) -> Result<Option<Duration>> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(&registry_id)
            .ok_or_else(|| SupervisorError::ProcessNotFound(registry_id.to_string()))?;

        let triggers_enabled = match reason {
            RestartReason::Exit => state.config.restart_on_process_exit,
            RestartReason::Crash => state.config.restart_on_crash,
            RestartReason::HealthCheckFailure => state.config.restart_on_health_check_failure,
            RestartReason::Manual => true,
        };
        if !triggers_enabled {
            return Ok(None);
        }

        match state.config.policy {
            RestartPolicy::Never => return Ok(None),
            RestartPolicy::UnlessStopped if state.manually_stopped_at.is_some() => {
                return Ok(None);
            }
            _ => {}
        }

        let now = Utc::now();
        let window_start = now - chrono::Duration::from_std(state.config.time_window).unwrap_or_default();
        state.attempts.retain(|t| *t >= window_start);
        if state.attempts.len() as u32 >= state.config.max_restarts {
            warn!(%registry_id, "restart rate limited");
            return Err(SupervisorError::RestartRateLimited(
                registry_id.to_string(),
                state.attempts.len() as u32,
            ));
        }

        let delay = state.config.delay_for(state.restart_count);
        Ok(Some(delay))
    }

    async fn execute_restart(
        &self,
        registry_id: RegistryId,
        reason: RestartReason,
    ) -> Result<RestartAttempt> {
        {
            let mut states = self.states.lock().unwrap();
            let state = states
                .get_mut(&registry_id)
                .ok_or_else(|| SupervisorError::ProcessNotFound(registry_id.to_string()))?;
            if state.in_progress {
                return Err(SupervisorError::RestartInProgress(registry_id.to_string()));
            }
            state.in_progress = true;
        }

        let started = std::time::Instant::now();
        let result = self.do_restart(registry_id).await;
        let duration = started.elapsed();

        self.total_attempts.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
        }

        let (new_pid, error) = match &result {
            Ok(pid) => (Some(*pid), None),
            Err(err) => (None, Some(err.to_string())),
        };

        let mut states = self.states.lock().unwrap();
        if let Some(state) = states.get_mut(&registry_id) {
            state.in_progress = false;
            state.attempts.push(Utc::now());
            if result.is_ok() {
                state.restart_count += 1;
            }
        }

        let attempt = RestartAttempt {
            attempt_id: Uuid::new_v4(),
            registry_id,
            pid: new_pid.unwrap_or(0),
            timestamp: Utc::now(),
            reason,
            success: result.is_ok(),
            new_pid,
            duration,
            error: error.clone(),
        };

        if let Some(err) = error {
            return Err(SupervisorError::RestartFailure(registry_id.to_string(), err));
        }
        info!(%registry_id, new_pid, "restart succeeded");
        Ok(attempt)
    }

    async fn do_restart(&self, registry_id: RegistryId) -> Result<u32> {
        let process = self
            .registry
            .get(registry_id)
            .ok_or_else(|| SupervisorError::ProcessNotFound(registry_id.to_string()))?;
        let pid = process.pid();

        self.adapter
            .kill_process(pid, crate::domain::Signal::Term)
            .await?;

        let mut updated = process.info.clone();
        updated.status = ProcessStatus::Starting;
        self.registry.update_process(registry_id, updated).await?;

        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use crate::domain::{BackoffStrategy, ProcessInfo};
    use crate::storage::InMemoryStorage;

    fn info(pid: u32) -> ProcessInfo {
        ProcessInfo {
            pid,
            ppid: None,
            name: "web".into(),
            command: "/bin/web".into(),
            args: vec![],
            user: Some("root".into()),
            cpu: 1.0,
            memory: 1024,
            vsz: 2048,
            rss: 1024,
            start_time: Utc::now(),
            status: ProcessStatus::Running,
        }
    }

    async fn harness(config: AutoRestartConfig) -> (Arc<ProcessRegistry>, AutoRestartEngine, RegistryId) {
        let registry = Arc::new(ProcessRegistry::new(Arc::new(InMemoryStorage::new())));
        let adapter = Arc::new(MockAdapter::new());
        adapter.set_processes(vec![info(100)]);
        let registry_id = registry.register_process(info(100)).await;
        let engine = AutoRestartEngine::new(registry.clone(), adapter);
        engine.install(registry_id, config);
        (registry, engine, registry_id)
    }

    #[tokio::test]
    async fn never_policy_skips_restart() {
        let (_r, engine, id) = harness(AutoRestartConfig {
            policy: RestartPolicy::Never,
            strategy: BackoffStrategy::Immediate,
            ..AutoRestartConfig::default()
        })
        .await;
        let result = engine.handle_failure(id, RestartReason::Crash).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn rate_limit_rejects_after_max_restarts_in_window() {
        let (_r, engine, id) = harness(AutoRestartConfig {
            policy: RestartPolicy::Always,
            strategy: BackoffStrategy::Immediate,
            max_restarts: 1,
            time_window: Duration::from_secs(60),
            ..AutoRestartConfig::default()
        })
        .await;
        let first = engine.handle_failure(id, RestartReason::Crash).await.unwrap();
        assert!(first.is_some());
        let second = engine.handle_failure(id, RestartReason::Crash).await;
        assert!(matches!(second, Err(SupervisorError::RestartRateLimited(_, _))));
    }

    #[tokio::test]
    async fn single_flight_rejects_concurrent_manual_restart() {
        let (_r, engine, id) = harness(AutoRestartConfig {
            policy: RestartPolicy::Always,
            strategy: BackoffStrategy::Immediate,
            ..AutoRestartConfig::default()
        })
        .await;
        {
            let mut states = engine.states.lock().unwrap();
            states.get_mut(&id).unwrap().in_progress = true;
        }
        let result = engine.manual_restart(id).await;
        assert!(matches!(result, Err(SupervisorError::RestartInProgress(_))));
    }

    #[tokio::test]
    async fn unless_stopped_skips_once_manually_stopped() {
        let (_r, engine, id) = harness(AutoRestartConfig {
            policy: RestartPolicy::UnlessStopped,
            strategy: BackoffStrategy::Immediate,
            ..AutoRestartConfig::default()
        })
        .await;
        engine.mark_manually_stopped(id);
        let result = engine.handle_failure(id, RestartReason::Crash).await.unwrap();
        assert!(result.is_none());
        engine.clear_manual_stop(id);
        let result = engine.handle_failure(id, RestartReason::Crash).await.unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn global_failure_ratio_tracks_successful_restarts() {
        let (_r, engine, id) = harness(AutoRestartConfig {
            strategy: BackoffStrategy::Immediate,
            ..AutoRestartConfig::default()
        })
        .await;
        assert_eq!(engine.global_failure_ratio(), 0.0);
        engine.manual_restart(id).await.unwrap();
        assert_eq!(engine.global_failure_ratio(), 0.0);
    }
}
