//! Worker Pool (spec.md §4.7): queue, workers, load balancer, and scaler for
//! one named pool. Workers are OS subprocesses spawned directly (the
//! `PlatformAdapter` is used only to verify liveness and to signal them,
//! matching its role as the narrow OS-touching boundary elsewhere).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Child;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    LoadBalancingAlgorithm, Pool, PoolTask, Result, ScalingStrategy, SupervisorError, TaskState,
    Worker, WorkerState,
};
use crate::ports::PlatformAdapter;
use crate::pool::balancer::LoadBalancer;
use crate::pool::queue::TaskQueue;

#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub total_workers: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub queued_tasks: usize,
    pub running_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub average_task_duration: Duration,
    pub worker_utilization: f32,
    pub throughput_per_second: f32,
}

struct WorkerProcess {
    worker: Worker,
    child: Option<Child>,
}

struct PoolInner {
    config: Pool,
    queue: TaskQueue,
    workers: HashMap<String, WorkerProcess>,
    tasks: HashMap<Uuid, PoolTask>,
    /// Handle to the subprocess actually executing each `Running` task,
    /// distinct from the long-lived worker process it was dispatched to.
    task_children: HashMap<Uuid, Child>,
    last_scale_event: Option<chrono::DateTime<Utc>>,
    completed: u64,
    failed: u64,
    total_duration: Duration,
    accepting: bool,
}

pub struct WorkerPool {
    inner: AsyncMutex<PoolInner>,
    adapter: Arc<dyn PlatformAdapter>,
    balancer: LoadBalancer,
    worker_sequence: AtomicU64,
}

impl WorkerPool {
    pub fn new(config: Pool, adapter: Arc<dyn PlatformAdapter>) -> Result<Self> {
        config
            .validate()
            .map_err(SupervisorError::SupervisionConfig)?;
        let max_queue_size = config.max_queue_size;
        let pool = Self {
            inner: AsyncMutex::new(PoolInner {
                config,
                queue: TaskQueue::new(max_queue_size),
                workers: HashMap::new(),
                tasks: HashMap::new(),
                task_children: HashMap::new(),
                last_scale_event: None,
                completed: 0,
                failed: 0,
                total_duration: Duration::ZERO,
                accepting: true,
            }),
            adapter,
            balancer: LoadBalancer::new(),
            worker_sequence: AtomicU64::new(0),
        };
        Ok(pool)
    }

    pub async fn submit(&self, mut task: PoolTask) -> Result<Uuid> {
        let mut inner = self.inner.lock().await;
        if !inner.accepting {
            return Err(SupervisorError::PoolNotFound(inner.config.id.clone()));
        }
        if inner.queue.is_full() {
            return Err(SupervisorError::PoolQueueFull(
                inner.config.id.clone(),
                inner.queue.len(),
            ));
        }
        task.enqueued_at = Utc::now();
        let task_id = task.task_id;
        inner.tasks.insert(task_id, task.clone());
        inner.queue.push(task);
        Ok(task_id)
    }

    async fn spawn_worker(&self, inner: &mut PoolInner) -> Result<String> {
        let seq = self.worker_sequence.fetch_add(1, Ordering::SeqCst);
        let worker_id = format!("{}-worker-{seq}", inner.config.id);
        let spawn_result = tokio::process::Command::new(&inner.config.worker_command)
            .args(&inner.config.worker_args)
            .kill_on_drop(true)
            .spawn();

        let (pid, child) = match spawn_result {
            Ok(child) => (child.id(), Some(child)),
            Err(err) => {
                warn!(error = %err, "failed to spawn pool worker");
                return Err(SupervisorError::AdapterFailure(format!(
                    "spawn worker failed: {err}"
                )));
            }
        };

        let mut worker = Worker::new(worker_id.clone(), pid, Utc::now());
        worker.state = WorkerState::Idle;
        inner
            .workers
            .insert(worker_id.clone(), WorkerProcess { worker, child });
        info!(pool = %inner.config.id, worker = %worker_id, "spawned pool worker");
        Ok(worker_id)
    }

    /// Ensures `minWorkers`/`initialWorkers` are running; called once on
    /// pool creation for `fixed` and `dynamic` strategies.
    pub async fn ensure_initial_workers(&self) -> Result<()> {
        let target = {
            let inner = self.inner.lock().await;
            inner
                .config
                .initial_workers
                .unwrap_or(inner.config.min_workers)
        };
        let mut inner = self.inner.lock().await;
        while inner.workers.len() < target {
            self.spawn_worker(&mut inner).await?;
        }
        Ok(())
    }

    /// Assigns as many queued tasks to idle workers as possible.
    pub async fn dispatch(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let algorithm = inner.config.load_balancing_algorithm;
        let weights = inner.config.worker_weights.clone();
        let mut dispatched = 0;

        loop {
            if inner.queue.is_empty() {
                break;
            }
            let workers: Vec<Worker> = inner.workers.values().map(|w| w.worker.clone()).collect();
            let Some(picked) = self.balancer.pick(algorithm, &workers, &weights) else {
                break;
            };
            let worker_id = picked.worker_id.clone();
            let Some(task) = inner.queue.pop_front() else {
                break;
            };
            let now = Utc::now();
            if let Some(entry) = inner.workers.get_mut(&worker_id) {
                entry.worker.state = WorkerState::Busy;
                entry.worker.current_task_id = Some(task.task_id);
                entry.worker.last_activity_at = now;
            }
            if let Some(tracked) = inner.tasks.get_mut(&task.task_id) {
                tracked.state = TaskState::Running;
                tracked.assigned_worker = Some(worker_id);
                tracked.started_at = Some(now);
            }
            self.spawn_task_process(&mut inner, &task).await;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Actually executes `task.command` as its own subprocess, distinct
    /// from the worker it was assigned to. A spawn failure fails the task
    /// immediately in place (spec.md §4.7).
    async fn spawn_task_process(&self, inner: &mut PoolInner, task: &PoolTask) {
        let mut command = tokio::process::Command::new(&task.command);
        command.args(&task.args).envs(task.env.clone()).kill_on_drop(true);
        if let Some(cwd) = &task.cwd {
            command.current_dir(cwd);
        }
        match command.spawn() {
            Ok(child) => {
                inner.task_children.insert(task.task_id, child);
            }
            Err(err) => {
                warn!(error = %err, task = %task.task_id, "failed to spawn task process");
                if let Some(tracked) = inner.tasks.get_mut(&task.task_id) {
                    tracked.state = TaskState::Failed;
                    tracked.finished_at = Some(Utc::now());
                    tracked.failure_reason = Some(format!("spawn failed: {err}"));
                }
                inner.failed += 1;
            }
        }
    }

    /// Polls every in-flight task's subprocess for completion and finalizes
    /// it, freeing the worker it was assigned to. Returns the number of
    /// tasks reaped this call.
    pub async fn reap_completed_tasks(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let finished: Vec<(Uuid, Option<i32>)> = {
            let mut out = Vec::new();
            for (task_id, child) in inner.task_children.iter_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    out.push((*task_id, status.code()));
                }
            }
            out
        };

        let now = Utc::now();
        for (task_id, exit_code) in &finished {
            inner.task_children.remove(task_id);
            let succeeded = *exit_code == Some(0);
            let worker_id = inner.tasks.get(task_id).and_then(|t| t.assigned_worker.clone());
            let started_at = inner.tasks.get(task_id).and_then(|t| t.started_at);

            if let Some(task) = inner.tasks.get_mut(task_id) {
                task.finished_at = Some(now);
                task.exit_code = *exit_code;
                task.state = if succeeded {
                    TaskState::Completed
                } else {
                    task.failure_reason = Some(format!("process exited with code {exit_code:?}"));
                    TaskState::Failed
                };
            }

            if succeeded {
                inner.completed += 1;
            } else {
                inner.failed += 1;
            }
            if let Some(started) = started_at {
                inner.total_duration += (now - started).to_std().unwrap_or_default();
            }
            if let Some(worker_id) = worker_id {
                if let Some(entry) = inner.workers.get_mut(&worker_id) {
                    entry.worker.state = WorkerState::Idle;
                    entry.worker.current_task_id = None;
                    entry.worker.last_activity_at = now;
                    if succeeded {
                        entry.worker.tasks_completed += 1;
                    } else {
                        entry.worker.tasks_failed += 1;
                    }
                }
            }
        }
        Ok(finished.len())
    }

    /// Records a task's completion (or failure) and frees its worker.
    pub async fn complete_task(
        &self,
        task_id: Uuid,
        exit_code: Option<i32>,
        failure_reason: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let worker_id = inner
            .tasks
            .get(&task_id)
            .and_then(|t| t.assigned_worker.clone());

        inner.task_children.remove(&task_id);
        let succeeded = failure_reason.is_none();
        let duration = {
            let task = inner
                .tasks
                .get_mut(&task_id)
                .ok_or_else(|| SupervisorError::TaskTimeout(task_id.to_string(), Duration::ZERO))?;
            task.finished_at = Some(now);
            task.exit_code = exit_code;
            task.failure_reason = failure_reason.clone();
            task.state = if succeeded {
                TaskState::Completed
            } else if task.retry > 0 {
                task.retry -= 1;
                task.state = TaskState::Queued;
                inner.queue.push_front(task.clone());
                TaskState::Queued
            } else {
                TaskState::Failed
            };
            task.started_at
                .map(|s| (now - s).to_std().unwrap_or_default())
                .unwrap_or_default()
        };

        if succeeded {
            inner.completed += 1;
        } else {
            inner.failed += 1;
        }
        inner.total_duration += duration;

        if let Some(worker_id) = worker_id {
            if let Some(entry) = inner.workers.get_mut(&worker_id) {
                entry.worker.state = WorkerState::Idle;
                entry.worker.current_task_id = None;
                entry.worker.last_activity_at = now;
                if succeeded {
                    entry.worker.tasks_completed += 1;
                } else {
                    entry.worker.tasks_failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Fails and replaces workers for tasks that exceeded their
    /// `options.timeout` (spec.md §4.7 Cancellation, `TaskTimeout`).
    pub async fn check_timeouts(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let timed_out: Vec<(Uuid, Option<String>)> = inner
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Running)
            .filter_map(|t| {
                let timeout = t.timeout?;
                let started = t.started_at?;
                let elapsed = (now - started).to_std().unwrap_or_default();
                (elapsed >= timeout).then(|| (t.task_id, t.assigned_worker.clone()))
            })
            .collect();

        for (task_id, worker_id) in &timed_out {
            if let Some(task) = inner.tasks.get_mut(task_id) {
                task.state = TaskState::Failed;
                task.finished_at = Some(now);
                task.failure_reason = Some("TaskTimeout".to_string());
            }
            if let Some(mut child) = inner.task_children.remove(task_id) {
                let _ = child.start_kill();
            }
            inner.failed += 1;
            if let Some(worker_id) = worker_id {
                warn!(worker = %worker_id, task = %task_id, "task exceeded timeout, replacing worker");
                self.terminate_worker(&mut inner, worker_id).await;
                if inner.workers.len() < inner.config.max_workers {
                    let _ = self.spawn_worker(&mut inner).await;
                }
            }
        }
        Ok(timed_out.len())
    }

    /// One autoscaling tick (spec.md §4.7). No-ops for `scheduled` (use
    /// `set_pool_size`). Also checks task timeouts, independent of the
    /// scaling cooldown.
    pub async fn scale_tick(&self) -> Result<()> {
        self.check_timeouts().await?;
        let mut inner = self.inner.lock().await;
        let strategy = inner.config.scaling_strategy;
        let now = Utc::now();
        if let Some(last) = inner.last_scale_event {
            let cooldown = chrono::Duration::from_std(inner.config.scale_cooldown).unwrap_or_default();
            if now - last < cooldown {
                return Ok(());
            }
        }

        match strategy {
            ScalingStrategy::Fixed | ScalingStrategy::Scheduled => {}
            ScalingStrategy::Dynamic => {
                let queue_depth = inner.queue.len();
                let max_workers = inner.config.max_workers;
                let min_workers = inner.config.min_workers;
                let idle_timeout =
                    chrono::Duration::from_std(inner.config.worker_idle_timeout).unwrap_or_default();

                if queue_depth > inner.workers.len() && inner.workers.len() < max_workers {
                    self.spawn_worker(&mut inner).await?;
                    inner.last_scale_event = Some(now);
                } else if inner.workers.len() > min_workers {
                    let idle_worker = inner
                        .workers
                        .iter()
                        .find(|(_, w)| {
                            w.worker.is_idle() && now - w.worker.last_activity_at >= idle_timeout
                        })
                        .map(|(id, _)| id.clone());
                    if let Some(id) = idle_worker {
                        self.terminate_worker(&mut inner, &id).await;
                        inner.last_scale_event = Some(now);
                    }
                }
            }
            ScalingStrategy::OnDemand => {
                let max_workers = inner.config.max_workers;
                let idle_timeout =
                    chrono::Duration::from_std(inner.config.worker_idle_timeout).unwrap_or_default();
                while inner.queue.len() > inner.workers.len() && inner.workers.len() < max_workers {
                    self.spawn_worker(&mut inner).await?;
                }
                let idle_workers: Vec<String> = inner
                    .workers
                    .iter()
                    .filter(|(_, w)| {
                        w.worker.is_idle() && now - w.worker.last_activity_at >= idle_timeout
                    })
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in idle_workers {
                    self.terminate_worker(&mut inner, &id).await;
                }
            }
        }
        Ok(())
    }

    /// `setPoolSize`: external driver for `scheduled` pools (and a manual
    /// override for the others).
    pub async fn set_pool_size(&self, target: usize) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let target = target.clamp(inner.config.min_workers, inner.config.max_workers);
        while inner.workers.len() < target {
            self.spawn_worker(&mut inner).await?;
        }
        while inner.workers.len() > target {
            let victim = inner
                .workers
                .iter()
                .find(|(_, w)| w.worker.is_idle())
                .map(|(id, _)| id.clone());
            match victim {
                Some(id) => self.terminate_worker(&mut inner, &id).await,
                None => break,
            }
        }
        Ok(())
    }

    /// Verifies every worker is alive via the adapter; replaces the dead
    /// or unhealthy ones.
    pub async fn health_tick(&self, failure_threshold: u32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let pids_and_ids: Vec<(String, Option<u32>)> = inner
            .workers
            .iter()
            .map(|(id, w)| (id.clone(), w.worker.pid))
            .collect();

        let mut to_replace = Vec::new();
        for (id, pid) in pids_and_ids {
            let alive = match pid {
                Some(pid) => self
                    .adapter
                    .get_process_info(pid)
                    .await
                    .unwrap_or(None)
                    .is_some(),
                None => false,
            };
            if !alive {
                if let Some(entry) = inner.workers.get_mut(&id) {
                    entry.worker.consecutive_health_failures += 1;
                    entry.worker.state = WorkerState::Unhealthy;
                    if entry.worker.consecutive_health_failures >= failure_threshold {
                        to_replace.push(id);
                    }
                }
            } else if let Some(entry) = inner.workers.get_mut(&id) {
                entry.worker.consecutive_health_failures = 0;
            }
        }

        for id in to_replace {
            warn!(worker = %id, "replacing unhealthy pool worker");
            self.terminate_worker(&mut inner, &id).await;
            self.spawn_worker(&mut inner).await?;
        }
        Ok(())
    }

    async fn terminate_worker(&self, inner: &mut PoolInner, worker_id: &str) {
        if let Some(mut entry) = inner.workers.remove(worker_id) {
            entry.worker.state = WorkerState::Stopping;
            if let Some(pid) = entry.worker.pid {
                let _ = self.adapter.kill_process(pid, crate::domain::Signal::Term).await;
            }
            if let Some(mut child) = entry.child.take() {
                let _ = child.start_kill();
            }
        }
    }

    /// Stops accepting submissions, drains running tasks up to
    /// `shutdownTimeout`, then terminates remaining workers.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.accepting = false;
        }
        let timeout = {
            let inner = self.inner.lock().await;
            inner.config.shutdown_timeout
        };
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let running = {
                let inner = self.inner.lock().await;
                inner.workers.values().filter(|w| !w.worker.is_idle()).count()
            };
            if running == 0 || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let mut inner = self.inner.lock().await;
        let ids: Vec<String> = inner.workers.keys().cloned().collect();
        for id in ids {
            self.terminate_worker(&mut inner, &id).await;
        }
        Ok(())
    }

    pub async fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.lock().await;
        let total = inner.workers.len();
        let idle = inner.workers.values().filter(|w| w.worker.is_idle()).count();
        let running = inner
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Running)
            .count();
        let completed_and_failed = inner.completed + inner.failed;
        let average_task_duration = if completed_and_failed > 0 {
            inner.total_duration / completed_and_failed as u32
        } else {
            Duration::ZERO
        };
        PoolMetrics {
            total_workers: total,
            idle_workers: idle,
            busy_workers: total - idle,
            queued_tasks: inner.queue.len(),
            running_tasks: running,
            completed_tasks: inner.completed,
            failed_tasks: inner.failed,
            average_task_duration,
            worker_utilization: if total > 0 {
                (total - idle) as f32 / total as f32
            } else {
                0.0
            },
            throughput_per_second: 0.0,
        }
    }

    pub async fn task(&self, task_id: Uuid) -> Option<PoolTask> {
        self.inner.lock().await.tasks.get(&task_id).cloned()
    }

    /// Background pump: dispatches queued tasks to idle workers, runs one
    /// autoscaling tick, and checks worker health, every `tick_interval`.
    /// Mirrors the sync reconciler's `spawn()` loop shape (spec.md §4.3/§4.7).
    pub fn spawn_pump(
        self: Arc<Self>,
        tick_interval: Duration,
        health_failure_threshold: u32,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(
                tokio::time::Instant::now() + tick_interval,
                tick_interval,
            );
            loop {
                interval.tick().await;
                if let Err(err) = self.reap_completed_tasks().await {
                    warn!(error = %err, "pool task reap failed");
                }
                if let Err(err) = self.dispatch().await {
                    warn!(error = %err, "pool dispatch tick failed");
                }
                if let Err(err) = self.scale_tick().await {
                    warn!(error = %err, "pool scale tick failed");
                }
                if let Err(err) = self.health_tick(health_failure_threshold).await {
                    warn!(error = %err, "pool health tick failed");
                }
            }
        })
    }
}
