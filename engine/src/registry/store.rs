//! Process Registry (spec.md §4.2): the authoritative in-memory model of
//! every known process, its lifecycle event log, tags, and management
//! status. All mutation is serialized through a single critical section;
//! readers get immutable snapshots (defensive copies).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{
    LifecycleEvent, LifecycleEventKind, ManagedProcess, ManagementConfig, ProcessInfo,
    ProcessQuery, RegistryId, RegistryProcess, Result, SupervisorError,
};
use crate::ports::process_storage::{CleanupReport, ProcessSnapshot};
use crate::ports::ProcessStorage;
use std::sync::Arc;

struct RegistryState {
    processes: HashMap<RegistryId, RegistryProcess>,
    pid_index: HashMap<u32, RegistryId>,
    tag_index: HashMap<String, HashSet<RegistryId>>,
    managed: HashMap<RegistryId, ManagedProcess>,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            processes: HashMap::new(),
            pid_index: HashMap::new(),
            tag_index: HashMap::new(),
            managed: HashMap::new(),
        }
    }
}

pub struct ProcessRegistry {
    state: Mutex<RegistryState>,
    storage: Arc<dyn ProcessStorage>,
}

impl ProcessRegistry {
    pub fn new(storage: Arc<dyn ProcessStorage>) -> Self {
        Self {
            state: Mutex::new(RegistryState::new()),
            storage,
        }
    }

    async fn emit(&self, event: LifecycleEvent) {
        if let Err(err) = self.storage.save_event(event).await {
            tracing::warn!(error = %err, "failed to persist lifecycle event");
        }
    }

    /// Registers a newly discovered process, or updates the existing one if
    /// `info.pid` is already known (spec.md §4.2, §8 property 1).
    pub async fn register_process(&self, info: ProcessInfo) -> RegistryId {
        let now = Utc::now();
        let (registry_id, event) = {
            let mut state = self.state.lock().unwrap();
            if let Some(&existing_id) = state.pid_index.get(&info.pid) {
                let process = state.processes.get_mut(&existing_id).expect("pid index consistent");
                process.info = info;
                process.last_seen = now;
                process.seen_count += 1;
                let event = LifecycleEvent::new(
                    existing_id,
                    process.pid(),
                    LifecycleEventKind::Updated,
                    now,
                );
                (existing_id, event)
            } else {
                let registry_id = RegistryId::generate();
                let pid = info.pid;
                let process = RegistryProcess::new(registry_id, info, now);
                state.processes.insert(registry_id, process);
                state.pid_index.insert(pid, registry_id);
                let event =
                    LifecycleEvent::new(registry_id, pid, LifecycleEventKind::Discovered, now);
                (registry_id, event)
            }
        };
        debug!(%registry_id, "registered process");
        self.emit(event).await;
        registry_id
    }

    /// Updates an already-registered process's snapshot. Fails with
    /// `ProcessNotFound` if `registry_id` is unknown.
    pub async fn update_process(&self, registry_id: RegistryId, info: ProcessInfo) -> Result<()> {
        let now = Utc::now();
        let event = {
            let mut state = self.state.lock().unwrap();
            let process = state
                .processes
                .get_mut(&registry_id)
                .ok_or_else(|| SupervisorError::ProcessNotFound(registry_id.to_string()))?;
            let previous_status = process.info.status;
            let new_status = info.status;
            let pid = info.pid;
            process.info = info;
            process.last_seen = now;
            process.seen_count += 1;
            if previous_status != new_status {
                LifecycleEvent::new(registry_id, pid, LifecycleEventKind::StatusChange, now)
                    .with_status_change(previous_status, new_status)
            } else {
                LifecycleEvent::new(registry_id, pid, LifecycleEventKind::Updated, now)
            }
        };
        self.emit(event).await;
        Ok(())
    }

    /// Removes `registry_id` from all indices, emitting `disappeared` first.
    pub async fn unregister_process(&self, registry_id: RegistryId) -> Result<()> {
        let now = Utc::now();
        let event = {
            let mut state = self.state.lock().unwrap();
            let process = state
                .processes
                .remove(&registry_id)
                .ok_or_else(|| SupervisorError::ProcessNotFound(registry_id.to_string()))?;
            state.pid_index.remove(&process.pid());
            for ids in state.tag_index.values_mut() {
                ids.remove(&registry_id);
            }
            state.managed.remove(&registry_id);
            LifecycleEvent::new(registry_id, process.pid(), LifecycleEventKind::Disappeared, now)
                .with_status_change(process.info.status, process.info.status)
        };
        info!(%registry_id, "unregistered process");
        self.emit(event).await;
        Ok(())
    }

    pub fn get(&self, registry_id: RegistryId) -> Option<RegistryProcess> {
        self.state.lock().unwrap().processes.get(&registry_id).cloned()
    }

    pub fn get_by_pid(&self, pid: u32) -> Option<RegistryProcess> {
        let state = self.state.lock().unwrap();
        state
            .pid_index
            .get(&pid)
            .and_then(|id| state.processes.get(id))
            .cloned()
    }

    pub fn known_pids(&self) -> HashSet<u32> {
        self.state.lock().unwrap().pid_index.keys().copied().collect()
    }

    pub fn query(&self, query: &ProcessQuery) -> Vec<RegistryProcess> {
        self.state
            .lock()
            .unwrap()
            .processes
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<RegistryProcess> {
        self.state.lock().unwrap().processes.values().cloned().collect()
    }

    pub fn tag_process(&self, registry_id: RegistryId, tag: impl Into<String>) -> Result<()> {
        let tag = tag.into();
        let mut state = self.state.lock().unwrap();
        if !state.processes.contains_key(&registry_id) {
            return Err(SupervisorError::ProcessNotFound(registry_id.to_string()));
        }
        state
            .processes
            .get_mut(&registry_id)
            .unwrap()
            .tags
            .insert(tag.clone());
        state.tag_index.entry(tag).or_default().insert(registry_id);
        Ok(())
    }

    pub fn untag_process(&self, registry_id: RegistryId, tag: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(process) = state.processes.get_mut(&registry_id) {
            process.tags.remove(tag);
        }
        if let Some(ids) = state.tag_index.get_mut(tag) {
            ids.remove(&registry_id);
        }
    }

    pub fn get_processes_by_tag(&self, tag: &str) -> Vec<RegistryProcess> {
        let state = self.state.lock().unwrap();
        state
            .tag_index
            .get(tag)
            .into_iter()
            .flatten()
            .filter_map(|id| state.processes.get(id))
            .cloned()
            .collect()
    }

    pub async fn manage_process(
        &self,
        registry_id: RegistryId,
        config: ManagementConfig,
    ) -> Result<()> {
        let now = Utc::now();
        let (event, pid) = {
            let mut state = self.state.lock().unwrap();
            let process = state
                .processes
                .get_mut(&registry_id)
                .ok_or_else(|| SupervisorError::ProcessNotFound(registry_id.to_string()))?;
            process.is_managed = true;
            let pid = process.pid();
            state
                .managed
                .insert(registry_id, ManagedProcess::new(registry_id, config));
            (
                LifecycleEvent::new(registry_id, pid, LifecycleEventKind::Managed, now),
                pid,
            )
        };
        let _ = pid;
        self.emit(event).await;
        Ok(())
    }

    pub async fn unmanage_process(&self, registry_id: RegistryId) -> Result<()> {
        let now = Utc::now();
        let event = {
            let mut state = self.state.lock().unwrap();
            let process = state
                .processes
                .get_mut(&registry_id)
                .ok_or_else(|| SupervisorError::ProcessNotFound(registry_id.to_string()))?;
            process.is_managed = false;
            let pid = process.pid();
            state.managed.remove(&registry_id);
            LifecycleEvent::new(registry_id, pid, LifecycleEventKind::Unmanaged, now)
        };
        self.emit(event).await;
        Ok(())
    }

    pub fn managed_process(&self, registry_id: RegistryId) -> Option<ManagedProcess> {
        self.state.lock().unwrap().managed.get(&registry_id).cloned()
    }

    pub fn update_managed_process(
        &self,
        registry_id: RegistryId,
        f: impl FnOnce(&mut ManagedProcess),
    ) {
        if let Some(m) = self.state.lock().unwrap().managed.get_mut(&registry_id) {
            f(m);
        }
    }

    pub fn all_managed_ids(&self) -> Vec<RegistryId> {
        self.state.lock().unwrap().managed.keys().copied().collect()
    }

    /// Returns `{registryId, processInfo, lifecycle[]}` tuples for every
    /// process currently tracked.
    pub async fn snapshot(&self) -> Vec<ProcessSnapshot> {
        let processes = self.all();
        let mut snapshots = Vec::with_capacity(processes.len());
        for process in processes {
            let events = self
                .storage
                .load_events(crate::ports::process_storage::EventQuery {
                    registry_id: Some(process.registry_id),
                    ..Default::default()
                })
                .await
                .unwrap_or_default();
            snapshots.push(ProcessSnapshot {
                process,
                lifecycle: events,
            });
        }
        snapshots
    }

    /// Clears all state and rehydrates from `snapshots`. Atomic from the
    /// caller's perspective: the old state is replaced in one critical
    /// section.
    pub fn restore(&self, snapshots: Vec<ProcessSnapshot>) {
        let mut state = self.state.lock().unwrap();
        *state = RegistryState::new();
        for snapshot in snapshots {
            let process = snapshot.process;
            let registry_id = process.registry_id;
            let pid = process.pid();
            for tag in &process.tags {
                state
                    .tag_index
                    .entry(tag.clone())
                    .or_default()
                    .insert(registry_id);
            }
            state.pid_index.insert(pid, registry_id);
            state.processes.insert(registry_id, process);
        }
    }

    pub async fn cleanup(
        &self,
        process_retention: chrono::Duration,
        event_retention: chrono::Duration,
    ) -> Result<CleanupReport> {
        let now = Utc::now();
        let process_cutoff = now - process_retention;
        let event_cutoff = now - event_retention;
        let stale_ids: Vec<RegistryId> = {
            let state = self.state.lock().unwrap();
            state
                .processes
                .values()
                .filter(|p| p.last_seen < process_cutoff)
                .map(|p| p.registry_id)
                .collect()
        };
        for id in &stale_ids {
            let _ = self.unregister_process(*id).await;
        }
        let storage_report = self.storage.cleanup(process_cutoff, event_cutoff).await?;
        Ok(CleanupReport {
            removed_processes: stale_ids.len().max(storage_report.removed_processes),
            removed_events: storage_report.removed_events,
        })
    }

    pub fn last_seen(&self, registry_id: RegistryId) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap()
            .processes
            .get(&registry_id)
            .map(|p| p.last_seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProcessStatus;
    use crate::storage::InMemoryStorage;

    fn info(pid: u32, status: ProcessStatus) -> ProcessInfo {
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
            status,
        }
    }

    fn registry() -> ProcessRegistry {
        ProcessRegistry::new(Arc::new(InMemoryStorage::new()))
    }

    #[tokio::test]
    async fn registering_same_pid_twice_reuses_registry_id_and_bumps_seen_count() {
        let reg = registry();
        let id1 = reg.register_process(info(100, ProcessStatus::Running)).await;
        let id2 = reg.register_process(info(100, ProcessStatus::Running)).await;
        assert_eq!(id1, id2);
        assert_eq!(reg.get(id1).unwrap().seen_count, 2);
    }

    #[tokio::test]
    async fn unregister_then_reregister_allocates_a_new_registry_id() {
        let reg = registry();
        let id1 = reg.register_process(info(100, ProcessStatus::Running)).await;
        reg.unregister_process(id1).await.unwrap();
        let id2 = reg.register_process(info(100, ProcessStatus::Running)).await;
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn lifecycle_events_start_with_discovered_exactly_once() {
        let reg = registry();
        let id = reg.register_process(info(100, ProcessStatus::Running)).await;
        reg.update_process(id, info(100, ProcessStatus::Running)).await.unwrap();
        reg.update_process(id, info(100, ProcessStatus::Error)).await.unwrap();

        let events = reg
            .storage
            .load_events(crate::ports::process_storage::EventQuery {
                registry_id: Some(id),
                ..Default::default()
            })
            .await
            .unwrap();
        // newest-first; reverse to check chronological ordering
        let mut chronological = events;
        chronological.reverse();
        assert_eq!(chronological[0].event, LifecycleEventKind::Discovered);
        assert_eq!(
            chronological.iter().filter(|e| e.event == LifecycleEventKind::Discovered).count(),
            1
        );
        assert_eq!(chronological[2].event, LifecycleEventKind::StatusChange);
    }

    #[tokio::test]
    async fn tagging_is_idempotent() {
        let reg = registry();
        let id = reg.register_process(info(100, ProcessStatus::Running)).await;
        reg.tag_process(id, "system").unwrap();
        reg.tag_process(id, "system").unwrap();
        assert_eq!(reg.get(id).unwrap().tags.len(), 1);
        reg.untag_process(id, "nonexistent");
        assert_eq!(reg.get(id).unwrap().tags.len(), 1);
        reg.untag_process(id, "system");
        assert!(reg.get(id).unwrap().tags.is_empty());
    }

    #[tokio::test]
    async fn snapshot_restore_roundtrips_public_queries() {
        let reg = registry();
        let id = reg.register_process(info(100, ProcessStatus::Running)).await;
        reg.tag_process(id, "service").unwrap();

        let snapshots = reg.snapshot().await;
        let fresh = registry();
        fresh.restore(snapshots);

        assert_eq!(fresh.all().len(), 1);
        assert_eq!(fresh.get_by_pid(100).unwrap().registry_id, id);
        assert_eq!(fresh.get_processes_by_tag("service").len(), 1);
    }

    #[tokio::test]
    async fn query_filter_never_panics_and_composes() {
        let reg = registry();
        reg.register_process(info(100, ProcessStatus::Running)).await;
        reg.register_process(info(200, ProcessStatus::Stopped)).await;

        assert_eq!(reg.query(&ProcessQuery::default()).len(), 2);

        let running_only = ProcessQuery {
            status: Some(ProcessStatus::Running),
            ..Default::default()
        };
        assert_eq!(reg.query(&running_only).len(), 1);
    }
}
