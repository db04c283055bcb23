//! Supervisor API (spec.md §4.9): the single entry point host code uses to
//! drive process discovery, health supervision, pools, and IPC.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::adapters::build_adapter;
use crate::config::SupervisorConfig;
use crate::domain::{
    AggregatedMetrics, AutoRestartConfig, HealthCheck, ManagementConfig, OverallHealthStatus,
    PoolTask, ProcessQuery, RegistryId, RegistryProcess, Result, Signal, SupervisorError,
    SystemHealthSummary, SystemMetrics,
};
use crate::health::{HealthMonitor, HealthMonitorConfig, HealthTransition};
use crate::ipc::IpcBroker;
use crate::pool::{PoolManager, PoolMetrics};
use crate::ports::PlatformAdapter;
use crate::registry::ProcessRegistry;
use crate::restart::AutoRestartEngine;
use crate::storage::InMemoryStorage;
use crate::sync::RegistryManager;

/// A node in the process tree built by `getProcessTree` (spec.md §4.9 /
/// supplemental item C.1): orphans whose parent is absent become roots.
#[derive(Debug, Clone)]
pub struct ProcessTreeNode {
    pub process: RegistryProcess,
    pub children: Vec<ProcessTreeNode>,
}

pub struct Supervisor {
    config: SupervisorConfig,
    adapter: Arc<dyn PlatformAdapter>,
    registry: Arc<ProcessRegistry>,
    registry_manager: Arc<RegistryManager>,
    health_monitor: Arc<HealthMonitor>,
    restart_engine: Arc<AutoRestartEngine>,
    pool_manager: Arc<PoolManager>,
    ipc_broker: Arc<IpcBroker>,
    metrics_history: AsyncMutex<Vec<SystemMetrics>>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        config.validate()?;
        let adapter = build_adapter(config.platform_adapter, config.allow_mock_adapter_fallback)?;
        Self::with_adapter(config, adapter)
    }

    /// Builds a `Supervisor` over a caller-supplied adapter, bypassing
    /// adapter selection. Used by integration tests to drive a shared
    /// `MockAdapter` directly instead of going through `AdapterSelection`.
    pub fn with_adapter(
        config: SupervisorConfig,
        adapter: Arc<dyn PlatformAdapter>,
    ) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(InMemoryStorage::new());
        let registry = Arc::new(ProcessRegistry::new(storage));
        let registry_manager = Arc::new(RegistryManager::new(
            registry.clone(),
            adapter.clone(),
            config.sync.clone(),
        ));
        let health_monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            adapter.clone(),
            HealthMonitorConfig {
                global_interval: config.health_monitoring.global_interval,
                healthy_threshold: config.health_monitoring.healthy_threshold,
                unhealthy_threshold: config.health_monitoring.unhealthy_threshold,
            },
        ));
        let restart_engine = Arc::new(AutoRestartEngine::new(registry.clone(), adapter.clone()));
        let pool_manager = Arc::new(PoolManager::new(adapter.clone()));
        let ipc_broker = Arc::new(IpcBroker::new());

        Ok(Self {
            config,
            adapter,
            registry,
            registry_manager,
            health_monitor,
            restart_engine,
            pool_manager,
            ipc_broker,
            metrics_history: AsyncMutex::new(Vec::new()),
            tasks: AsyncMutex::new(Vec::new()),
        })
    }

    /// Spawns the background timers: sync tick, health tick, and (if
    /// enabled) system metrics collection.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        tasks.push(self.registry_manager.clone().spawn());

        if self.config.enable_auto_restart {
            let this = self.clone();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(this.config.health_monitoring.global_interval);
                loop {
                    interval.tick().await;
                    let transitions = this.health_monitor.tick().await;
                    this.dispatch_restarts(transitions).await;
                }
            }));
        }

        if self.config.monitor_system_metrics {
            let this = self.clone();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(this.config.refresh_interval);
                loop {
                    interval.tick().await;
                    if let Ok(metrics) = this.adapter.get_system_metrics().await {
                        let mut history = this.metrics_history.lock().await;
                        history.push(metrics);
                        if history.len() > this.config.buffer_size {
                            let overflow = history.len() - this.config.buffer_size;
                            history.drain(0..overflow);
                        }
                    }
                }
            }));
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        self.pool_manager.shutdown_all().await?;
        Ok(())
    }

    async fn dispatch_restarts(&self, transitions: Vec<HealthTransition>) {
        for transition in transitions {
            if transition.new_status == OverallHealthStatus::Healthy {
                continue;
            }
            if let Ok(Some(attempt)) = self
                .restart_engine
                .handle_failure(transition.registry_id, crate::domain::RestartReason::HealthCheckFailure)
                .await
            {
                warn!(
                    registry_id = %transition.registry_id,
                    success = attempt.success,
                    "auto-restart dispatched after health check failure"
                );
            }
        }
    }

    /// Runs one reconciliation pass immediately, outside the background
    /// sync loop started by `start()`. Returns `None` if a tick is already
    /// in progress (spec.md §4.3, §5).
    pub async fn trigger_sync(&self) -> Option<Result<crate::sync::SyncReport>> {
        self.registry_manager.sync_tick().await
    }

    // ---- Process queries ----

    pub fn get_process_list(&self) -> Vec<RegistryProcess> {
        self.registry.all()
    }

    pub fn find_processes(&self, query: &ProcessQuery) -> Vec<RegistryProcess> {
        self.registry.query(query)
    }

    /// Builds a forest from `ppid`; orphans whose parent is absent become
    /// roots (spec.md §4.9).
    pub fn get_process_tree(&self) -> Result<Vec<ProcessTreeNode>> {
        if !self.config.enable_process_tree {
            return Err(SupervisorError::SupervisionConfig(
                "process tree is disabled".into(),
            ));
        }
        let all = self.registry.all();
        let mut children_by_ppid: HashMap<u32, Vec<RegistryProcess>> = HashMap::new();
        let known_pids: HashSet<u32> = all.iter().map(|p| p.pid()).collect();
        let mut roots = Vec::new();

        for process in &all {
            match process.info.ppid {
                Some(ppid) if known_pids.contains(&ppid) => {
                    children_by_ppid.entry(ppid).or_default().push(process.clone());
                }
                _ => roots.push(process.clone()),
            }
        }

        fn build(process: RegistryProcess, children_by_ppid: &HashMap<u32, Vec<RegistryProcess>>) -> ProcessTreeNode {
            let children = children_by_ppid
                .get(&process.pid())
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|child| build(child, children_by_ppid))
                .collect();
            ProcessTreeNode { process, children }
        }

        Ok(roots
            .into_iter()
            .map(|root| build(root, &children_by_ppid))
            .collect())
    }

    // ---- Lifecycle control ----

    pub async fn kill_process(&self, pid: u32, signal: Signal) -> Result<()> {
        self.adapter.kill_process(pid, signal).await
    }

    pub async fn suspend_process(&self, pid: u32) -> Result<()> {
        self.adapter.suspend_process(pid).await
    }

    pub async fn resume_process(&self, pid: u32) -> Result<()> {
        self.adapter.resume_process(pid).await
    }

    // ---- Metrics ----

    pub async fn get_system_metrics(&self) -> Result<SystemMetrics> {
        self.adapter.get_system_metrics().await
    }

    pub async fn get_metrics_history(&self) -> Vec<SystemMetrics> {
        self.metrics_history.lock().await.clone()
    }

    /// Returns min/max/avg for cpu and memory percent over `[since, until]`,
    /// plus summed disk reads/writes and the sample count. Fails when no
    /// samples fall in range (spec.md §4.9, testable property 12).
    pub async fn get_aggregated_metrics(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<AggregatedMetrics> {
        let history = self.metrics_history.lock().await;
        let samples: Vec<&SystemMetrics> = history
            .iter()
            .filter(|m| m.timestamp >= since && m.timestamp <= until)
            .collect();
        if samples.is_empty() {
            return Err(SupervisorError::SupervisionConfig(
                "no metrics samples in the requested range".into(),
            ));
        }

        let n = samples.len() as f32;
        let cpu_min = samples.iter().map(|s| s.cpu_percent).fold(f32::MAX, f32::min);
        let cpu_max = samples.iter().map(|s| s.cpu_percent).fold(f32::MIN, f32::max);
        let cpu_avg = samples.iter().map(|s| s.cpu_percent).sum::<f32>() / n;
        let mem_min = samples.iter().map(|s| s.memory_percent()).fold(f32::MAX, f32::min);
        let mem_max = samples.iter().map(|s| s.memory_percent()).fold(f32::MIN, f32::max);
        let mem_avg = samples.iter().map(|s| s.memory_percent()).sum::<f32>() / n;

        Ok(AggregatedMetrics {
            sample_count: samples.len(),
            cpu_min,
            cpu_max,
            cpu_avg,
            memory_min_percent: mem_min,
            memory_max_percent: mem_max,
            memory_avg_percent: mem_avg,
            disk_read_bytes_total: samples.iter().map(|s| s.disk_read_bytes_per_sec).sum(),
            disk_write_bytes_total: samples.iter().map(|s| s.disk_write_bytes_per_sec).sum(),
        })
    }

    /// `watchProcess`: a lazily-polled channel updated at `refreshInterval`,
    /// closed when the process disappears (spec.md §9: pull-based, not
    /// reactive).
    pub fn watch_process(self: &Arc<Self>, pid: u32) -> mpsc::Receiver<RegistryProcess> {
        let (tx, rx) = mpsc::channel(16);
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.config.refresh_interval);
            loop {
                interval.tick().await;
                match this.registry.get_by_pid(pid) {
                    Some(process) => {
                        if tx.send(process).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });
        rx
    }

    // ---- Health & supervision ----

    pub async fn start_supervision(
        &self,
        registry_id: RegistryId,
        management: ManagementConfig,
        checks: Vec<HealthCheck>,
        restart: AutoRestartConfig,
    ) -> Result<()> {
        self.registry.manage_process(registry_id, management).await?;
        self.health_monitor.supervise(registry_id, checks)?;
        self.restart_engine.install(registry_id, restart);
        Ok(())
    }

    pub async fn stop_supervision(&self, registry_id: RegistryId) -> Result<()> {
        self.health_monitor.stop_supervising(registry_id);
        self.restart_engine.remove(registry_id);
        self.registry.unmanage_process(registry_id).await
    }

    pub async fn trigger_health_check(
        &self,
        registry_id: RegistryId,
    ) -> Result<OverallHealthStatus> {
        self.health_monitor.trigger_check(registry_id).await
    }

    pub async fn restart_process(&self, registry_id: RegistryId) -> Result<crate::domain::RestartAttempt> {
        self.restart_engine.manual_restart(registry_id).await
    }

    /// Reports a `processExit` (or `crash`) event for policy-driven
    /// auto-restart, exercising the same rate-limited/backoff path as a
    /// health-check failure, just with a different trigger (spec.md §4.5,
    /// §8 property 6). Unlike `restartProcess`, this goes through
    /// `decide()` and is subject to policy, backoff, and rate limiting.
    pub async fn report_process_exit(
        &self,
        registry_id: RegistryId,
        reason: crate::domain::RestartReason,
    ) -> Result<Option<crate::domain::RestartAttempt>> {
        self.restart_engine.handle_failure(registry_id, reason).await
    }

    /// `healthy | degraded | critical` posture over every supervised
    /// process (spec.md §4.6, supplemental item C.2).
    pub fn get_system_health_summary(&self) -> SystemHealthSummary {
        let supervised_ids = self.health_monitor.supervised_ids();
        let unhealthy_count = supervised_ids
            .iter()
            .filter(|id| {
                !matches!(
                    self.health_monitor.health_state(**id).map(|s| s.overall_status),
                    Some(OverallHealthStatus::Healthy)
                )
            })
            .count();
        SystemHealthSummary::compute(
            supervised_ids.len(),
            unhealthy_count,
            self.restart_engine.global_failure_ratio(),
        )
    }

    // ---- Pools ----

    pub async fn create_pool(&self, config: crate::domain::Pool) -> Result<()> {
        if !self.config.enable_pooling {
            return Err(SupervisorError::SupervisionConfig(
                "pooling is disabled".into(),
            ));
        }
        self.pool_manager.create_pool(config).await?;
        Ok(())
    }

    pub async fn remove_pool(&self, pool_id: &str) -> Result<()> {
        self.pool_manager.remove_pool(pool_id).await
    }

    pub async fn submit_task_to_pool(&self, pool_id: &str, task: PoolTask) -> Result<uuid::Uuid> {
        self.pool_manager.submit_task(pool_id, task).await
    }

    pub async fn get_pool_status(&self, pool_id: &str) -> Result<PoolMetrics> {
        self.pool_manager.pool_status(pool_id).await
    }

    pub async fn scale_pool(&self, pool_id: &str, target: usize) -> Result<()> {
        self.pool_manager.scale_pool(pool_id, target).await
    }

    // ---- IPC ----

    pub fn register_process_for_ipc(&self, pid: u32) -> String {
        let (process_id, _rx) = self.ipc_broker.register_process(pid);
        process_id
    }

    pub fn unregister_process_from_ipc(&self, process_id: &str) {
        self.ipc_broker.unregister_process(process_id);
    }

    pub fn send_ipc_message(&self, target: &str, payload: serde_json::Value) -> Result<()> {
        self.ipc_broker.send_to_process(target, payload)
    }

    pub async fn request_ipc_response(
        &self,
        target: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<crate::domain::IpcResponse> {
        self.ipc_broker.request_from_process(target, payload, timeout).await
    }

    pub fn broadcast_ipc_message(&self, payload: serde_json::Value) -> usize {
        self.ipc_broker.broadcast(payload)
    }

    pub fn get_ipc_connections(&self) -> Vec<String> {
        self.ipc_broker.connections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterSelection;

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            platform_adapter: AdapterSelection::Mock,
            monitor_system_metrics: false,
            enable_auto_restart: false,
            ..SupervisorConfig::default()
        }
    }

    #[tokio::test]
    async fn process_tree_promotes_orphans_to_roots() {
        let supervisor = Supervisor::new(test_config()).unwrap();
        let mut child = crate::domain::ProcessInfo {
            pid: 200,
            ppid: Some(999),
            name: "child".into(),
            command: "/bin/child".into(),
            args: vec![],
            user: None,
            cpu: 0.0,
            memory: 0,
            vsz: 0,
            rss: 0,
            start_time: Utc::now(),
            status: crate::domain::ProcessStatus::Running,
        };
        supervisor.registry.register_process(child.clone()).await;
        child.pid = 100;
        child.ppid = None;
        supervisor.registry.register_process(child).await;

        let tree = supervisor.get_process_tree().unwrap();
        assert_eq!(tree.len(), 2, "unmatched ppid 999 promotes pid 200 to a root");
    }

    #[tokio::test]
    async fn aggregated_metrics_fails_with_no_samples() {
        let supervisor = Supervisor::new(test_config()).unwrap();
        let result = supervisor
            .get_aggregated_metrics(Utc::now() - chrono::Duration::seconds(10), Utc::now())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn disabled_process_tree_returns_supervision_config_error() {
        let supervisor = Supervisor::new(SupervisorConfig {
            enable_process_tree: false,
            platform_adapter: AdapterSelection::Mock,
            ..SupervisorConfig::default()
        })
        .unwrap();
        assert!(matches!(
            supervisor.get_process_tree(),
            Err(SupervisorError::SupervisionConfig(_))
        ));
    }

    #[tokio::test]
    async fn disabled_pooling_rejects_create_pool() {
        let supervisor = Supervisor::new(test_config()).unwrap();
        let pool = crate::domain::Pool {
            id: "p".into(),
            name: "p".into(),
            worker_command: "/bin/true".into(),
            worker_args: vec![],
            min_workers: 1,
            max_workers: 1,
            initial_workers: None,
            scaling_strategy: crate::domain::ScalingStrategy::Fixed,
            load_balancing_algorithm: crate::domain::LoadBalancingAlgorithm::RoundRobin,
            health_check_interval: Duration::from_secs(10),
            worker_idle_timeout: Duration::from_secs(60),
            task_timeout: Duration::from_secs(30),
            max_queue_size: 4,
            worker_weights: HashMap::new(),
            scale_cooldown: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            supervisor.create_pool(pool).await,
            Err(SupervisorError::SupervisionConfig(_))
        ));
    }

    #[tokio::test]
    async fn ipc_broadcast_reaches_registered_processes() {
        let supervisor = Supervisor::new(test_config()).unwrap();
        let _id = supervisor.register_process_for_ipc(100);
        let delivered = supervisor.broadcast_ipc_message(serde_json::json!({"type": "ping"}));
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn system_health_summary_is_healthy_with_no_supervision() {
        let supervisor = Supervisor::new(test_config()).unwrap();
        let summary = supervisor.get_system_health_summary();
        assert_eq!(summary.level, crate::domain::SystemHealthLevel::Healthy);
        assert_eq!(summary.supervised_count, 0);
    }
}
