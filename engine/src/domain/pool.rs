//! Worker pool domain types: pool configuration, queued tasks, and workers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingStrategy {
    Fixed,
    Dynamic,
    OnDemand,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancingAlgorithm {
    RoundRobin,
    LeastConnections,
    LeastBusy,
    Weighted,
    Random,
}

#[derive(Debug, Clone)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub worker_command: String,
    pub worker_args: Vec<String>,
    pub min_workers: usize,
    pub max_workers: usize,
    pub initial_workers: Option<usize>,
    pub scaling_strategy: ScalingStrategy,
    pub load_balancing_algorithm: LoadBalancingAlgorithm,
    pub health_check_interval: Duration,
    pub worker_idle_timeout: Duration,
    pub task_timeout: Duration,
    pub max_queue_size: usize,
    /// Per-worker weight for `weighted` load balancing; workers absent from
    /// this map default to weight 1 (spec.md supplemental item C.3).
    pub worker_weights: HashMap<String, u32>,
    pub scale_cooldown: Duration,
    pub shutdown_timeout: Duration,
}

impl Pool {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_workers > self.max_workers {
            return Err(format!(
                "minWorkers ({}) must be <= maxWorkers ({})",
                self.min_workers, self.max_workers
            ));
        }
        if self.worker_command.is_empty() {
            return Err("workerCommand must not be empty".into());
        }
        if self.max_queue_size == 0 {
            return Err("maxQueueSize must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Queued,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PoolTask {
    pub task_id: Uuid,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub priority: i32,
    pub retry: u32,
    pub enqueued_at: DateTime<Utc>,
    pub state: TaskState,
    pub assigned_worker: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub failure_reason: Option<String>,
}

impl PoolTask {
    pub fn new(command: String, args: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            command,
            args,
            cwd: None,
            env: HashMap::new(),
            timeout: None,
            priority: 0,
            retry: 0,
            enqueued_at: now,
            state: TaskState::Queued,
            assigned_worker: None,
            started_at: None,
            finished_at: None,
            exit_code: None,
            failure_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Starting,
    Idle,
    Busy,
    Unhealthy,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Worker {
    pub worker_id: String,
    pub pid: Option<u32>,
    pub state: WorkerState,
    pub current_task_id: Option<Uuid>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub consecutive_health_failures: u32,
}

impl Worker {
    pub fn new(worker_id: String, pid: Option<u32>, now: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            pid,
            state: WorkerState::Starting,
            current_task_id: None,
            tasks_completed: 0,
            tasks_failed: 0,
            started_at: now,
            last_activity_at: now,
            consecutive_health_failures: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, WorkerState::Idle)
    }
}
