//! Registry Manager / sync reconciler (spec.md §4.3): drives the registry
//! from the platform adapter on a timer.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::Result;
use crate::ports::PlatformAdapter;
use crate::registry::{categorize, ProcessRegistry};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval: Duration,
    pub enable_discovery: bool,
    pub enable_tracking: bool,
    pub enable_dead_cleanup: bool,
    pub dead_process_timeout: Duration,
    pub apply_category_tags: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval: Duration::from_secs(2),
            enable_discovery: true,
            enable_tracking: true,
            enable_dead_cleanup: true,
            dead_process_timeout: Duration::from_secs(30),
            apply_category_tags: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub discovered: usize,
    pub updated: usize,
    pub disappeared: usize,
}

pub struct RegistryManager {
    registry: Arc<ProcessRegistry>,
    adapter: Arc<dyn PlatformAdapter>,
    config: SyncConfig,
    sync_error_count: AtomicU32,
    last_sync_time: AsyncMutex<Option<chrono::DateTime<Utc>>>,
    /// Held for the duration of a tick; a second tick attempting to start
    /// while one is in flight is skipped (spec.md §5).
    tick_lock: AsyncMutex<()>,
}

impl RegistryManager {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        adapter: Arc<dyn PlatformAdapter>,
        config: SyncConfig,
    ) -> Self {
        Self {
            registry,
            adapter,
            config,
            sync_error_count: AtomicU32::new(0),
            last_sync_time: AsyncMutex::new(None),
            tick_lock: AsyncMutex::new(()),
        }
    }

    pub fn sync_error_count(&self) -> u32 {
        self.sync_error_count.load(Ordering::SeqCst)
    }

    pub async fn last_sync_time(&self) -> Option<chrono::DateTime<Utc>> {
        *self.last_sync_time.lock().await
    }

    /// Runs one reconciliation pass. Returns `None` if a tick is already in
    /// progress (skipped, not an error).
    pub async fn sync_tick(&self) -> Option<Result<SyncReport>> {
        let _guard = match self.tick_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("sync tick skipped: previous tick still in progress");
                return None;
            }
        };
        Some(self.run_tick().await)
    }

    async fn run_tick(&self) -> Result<SyncReport> {
        let process_list = match self.adapter.get_process_list().await {
            Ok(list) => list,
            Err(err) => {
                self.sync_error_count.fetch_add(1, Ordering::SeqCst);
                warn!(error = %err, "sync tick failed, registry left unchanged");
                return Err(err);
            }
        };

        let now = Utc::now();
        let current_pids: HashSet<u32> = process_list.iter().map(|p| p.pid).collect();
        let known_pids = self.registry.known_pids();

        let mut report = SyncReport::default();

        if self.config.enable_discovery || self.config.enable_tracking {
            for info in process_list {
                let pid = info.pid;
                if let Some(existing) = self.registry.get_by_pid(pid) {
                    if !self.config.enable_tracking {
                        continue;
                    }
                    let registry_id = existing.registry_id;
                    self.registry.update_process(registry_id, info).await?;
                    report.updated += 1;
                } else {
                    if !self.config.enable_discovery {
                        continue;
                    }
                    let registry_id = self.registry.register_process(info.clone()).await;
                    if self.config.apply_category_tags {
                        let category = categorize(&info);
                        let _ = self.registry.tag_process(registry_id, category.tag());
                    }
                    report.discovered += 1;
                }
            }
        }

        if self.config.enable_dead_cleanup {
            let dead_timeout = chrono::Duration::from_std(self.config.dead_process_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));
            for pid in known_pids.difference(&current_pids) {
                if let Some(process) = self.registry.get_by_pid(*pid) {
                    if now - process.last_seen >= dead_timeout {
                        if self.registry.unregister_process(process.registry_id).await.is_ok() {
                            report.disappeared += 1;
                        }
                    }
                }
            }
        }

        self.sync_error_count.store(0, Ordering::SeqCst);
        *self.last_sync_time.lock().await = Some(now);
        info!(
            discovered = report.discovered,
            updated = report.updated,
            disappeared = report.disappeared,
            "sync tick complete"
        );
        Ok(report)
    }

    /// Spawns the periodic sync loop; cancel the returned handle to stop it.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.auto_sync {
                return;
            }
            let mut interval = tokio::time::interval(self.config.sync_interval);
            loop {
                interval.tick().await;
                let _ = self.sync_tick().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use crate::domain::{ProcessInfo, ProcessStatus};
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

    #[tokio::test]
    async fn discovers_new_processes_and_tracks_seen_count() {
        let registry = Arc::new(ProcessRegistry::new(Arc::new(InMemoryStorage::new())));
        let adapter = Arc::new(MockAdapter::new());
        adapter.set_processes(vec![info(100), info(200)]);

        let manager = Arc::new(RegistryManager::new(
            registry.clone(),
            adapter.clone(),
            SyncConfig::default(),
        ));

        let report = manager.sync_tick().await.unwrap().unwrap();
        assert_eq!(report.discovered, 2);
        assert_eq!(registry.all().len(), 2);

        let report2 = manager.sync_tick().await.unwrap().unwrap();
        assert_eq!(report2.updated, 2);
        assert_eq!(registry.get_by_pid(100).unwrap().seen_count, 2);
    }

    #[tokio::test]
    async fn disappeared_process_is_unregistered_after_dead_timeout() {
        let registry = Arc::new(ProcessRegistry::new(Arc::new(InMemoryStorage::new())));
        let adapter = Arc::new(MockAdapter::new());
        adapter.set_processes(vec![info(100), info(200)]);

        let manager = Arc::new(RegistryManager::new(
            registry.clone(),
            adapter.clone(),
            SyncConfig {
                dead_process_timeout: Duration::from_millis(1),
                ..SyncConfig::default()
            },
        ));
        manager.sync_tick().await.unwrap().unwrap();
        assert_eq!(registry.all().len(), 2);

        adapter.remove_process(200);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = manager.sync_tick().await.unwrap().unwrap();
        assert_eq!(report.disappeared, 1);
        assert_eq!(registry.all().len(), 1);
    }

    #[tokio::test]
    async fn adapter_failure_does_not_mutate_registry() {
        struct FailingAdapter;
        #[async_trait::async_trait]
        impl PlatformAdapter for FailingAdapter {
            async fn get_process_list(&self) -> Result<Vec<ProcessInfo>> {
                Err(crate::domain::SupervisorError::AdapterFailure("boom".into()))
            }
            async fn get_process_info(&self, _pid: u32) -> Result<Option<ProcessInfo>> {
                Ok(None)
            }
            async fn get_system_metrics(&self) -> Result<crate::domain::SystemMetrics> {
                unimplemented!()
            }
            async fn kill_process(&self, _pid: u32, _signal: crate::domain::Signal) -> Result<()> {
                Ok(())
            }
        }

        let registry = Arc::new(ProcessRegistry::new(Arc::new(InMemoryStorage::new())));
        let manager = Arc::new(RegistryManager::new(
            registry.clone(),
            Arc::new(FailingAdapter),
            SyncConfig::default(),
        ));

        let result = manager.sync_tick().await.unwrap();
        assert!(result.is_err());
        assert_eq!(manager.sync_error_count(), 1);
        assert!(registry.all().is_empty());
    }
}
