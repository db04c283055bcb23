//! Pool Manager (spec.md §4.8): orchestrates multiple named worker pools.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::{Pool, PoolTask, Result, SupervisorError};
use crate::ports::PlatformAdapter;
use crate::pool::worker_pool::{PoolMetrics, WorkerPool};

/// Workload hint for `optimal_pool_size` (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadHint {
    CpuIntensive,
    IoBound,
    Mixed,
    Lightweight,
}

/// How often a pool's background pump dispatches, autoscales, and health
/// checks its workers (spec.md §4.7).
const POOL_PUMP_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);
const POOL_HEALTH_FAILURE_THRESHOLD: u32 = 3;

struct ManagedPool {
    pool: Arc<WorkerPool>,
    pump: JoinHandle<()>,
}

pub struct PoolManager {
    adapter: Arc<dyn PlatformAdapter>,
    pools: RwLock<HashMap<String, ManagedPool>>,
}

impl PoolManager {
    pub fn new(adapter: Arc<dyn PlatformAdapter>) -> Self {
        Self {
            adapter,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_pool(&self, config: Pool) -> Result<Arc<WorkerPool>> {
        let id = config.id.clone();
        let pool = Arc::new(WorkerPool::new(config, self.adapter.clone())?);
        pool.ensure_initial_workers().await?;
        let pump = pool.clone().spawn_pump(POOL_PUMP_INTERVAL, POOL_HEALTH_FAILURE_THRESHOLD);
        self.pools.write().await.insert(id, ManagedPool { pool: pool.clone(), pump });
        Ok(pool)
    }

    pub async fn remove_pool(&self, pool_id: &str) -> Result<()> {
        let managed = self
            .pools
            .write()
            .await
            .remove(pool_id)
            .ok_or_else(|| SupervisorError::PoolNotFound(pool_id.to_string()))?;
        managed.pump.abort();
        managed.pool.shutdown().await
    }

    pub async fn get_pool(&self, pool_id: &str) -> Result<Arc<WorkerPool>> {
        self.pools
            .read()
            .await
            .get(pool_id)
            .map(|managed| managed.pool.clone())
            .ok_or_else(|| SupervisorError::PoolNotFound(pool_id.to_string()))
    }

    pub async fn submit_task(&self, pool_id: &str, task: PoolTask) -> Result<Uuid> {
        self.get_pool(pool_id).await?.submit(task).await
    }

    pub async fn pool_status(&self, pool_id: &str) -> Result<PoolMetrics> {
        Ok(self.get_pool(pool_id).await?.metrics().await)
    }

    pub async fn scale_pool(&self, pool_id: &str, target: usize) -> Result<()> {
        self.get_pool(pool_id).await?.set_pool_size(target).await
    }

    pub async fn aggregate_metrics(&self) -> HashMap<String, PoolMetrics> {
        let pools = self.pools.read().await;
        let mut out = HashMap::with_capacity(pools.len());
        for (id, managed) in pools.iter() {
            out.insert(id.clone(), managed.pool.metrics().await);
        }
        out
    }

    pub async fn shutdown_all(&self) -> Result<()> {
        let managed: Vec<ManagedPool> = self.pools.write().await.drain().map(|(_, v)| v).collect();
        for managed in managed {
            managed.pump.abort();
            managed.pool.shutdown().await?;
        }
        Ok(())
    }

    /// Derives `(minWorkers, maxWorkers, initialWorkers)` from the host CPU
    /// count and a workload hint (spec.md §4.8).
    pub fn optimal_pool_size(cpu_count: usize, hint: WorkloadHint) -> (usize, usize, usize) {
        let cpu_count = cpu_count.max(1);
        match hint {
            WorkloadHint::CpuIntensive => (1, cpu_count, cpu_count),
            WorkloadHint::IoBound => (2, cpu_count * 4, cpu_count * 2),
            WorkloadHint::Mixed => (1, cpu_count * 2, cpu_count),
            WorkloadHint::Lightweight => (1, cpu_count, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use crate::domain::{LoadBalancingAlgorithm, ScalingStrategy};
    use chrono::Utc;
    use std::time::Duration;

    fn pool_config(id: &str) -> Pool {
        Pool {
            id: id.to_string(),
            name: id.to_string(),
            worker_command: "/bin/true".to_string(),
            worker_args: vec![],
            min_workers: 1,
            max_workers: 2,
            initial_workers: None,
            scaling_strategy: ScalingStrategy::Fixed,
            load_balancing_algorithm: LoadBalancingAlgorithm::RoundRobin,
            health_check_interval: Duration::from_secs(10),
            worker_idle_timeout: Duration::from_secs(60),
            task_timeout: Duration::from_secs(30),
            max_queue_size: 4,
            worker_weights: HashMap::new(),
            scale_cooldown: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn unknown_pool_returns_pool_not_found() {
        let manager = PoolManager::new(Arc::new(MockAdapter::new()));
        let result = manager.get_pool("missing").await;
        assert!(matches!(result, Err(SupervisorError::PoolNotFound(_))));
    }

    #[tokio::test]
    async fn create_then_submit_then_status_roundtrips() {
        let manager = PoolManager::new(Arc::new(MockAdapter::new()));
        manager.create_pool(pool_config("p1")).await.unwrap();
        manager
            .submit_task("p1", crate::domain::PoolTask::new("run".into(), vec![], Utc::now()))
            .await
            .unwrap();
        let status = manager.pool_status("p1").await.unwrap();
        assert_eq!(status.queued_tasks, 1);
    }

    #[test]
    fn optimal_pool_size_scales_io_bound_above_cpu_count() {
        let (min, max, initial) = PoolManager::optimal_pool_size(4, WorkloadHint::IoBound);
        assert_eq!(min, 2);
        assert_eq!(max, 16);
        assert_eq!(initial, 8);
    }
}
