//! Pluggable storage interface for registry persistence (spec.md §6). An
//! in-memory implementation is required; the contract must allow a
//! persistent implementation (e.g. sqlite, a KV store) without touching
//! callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{LifecycleEvent, Result, RegistryProcess};

/// A point-in-time dump of one registered process, used by `snapshot`
/// and `restore`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProcessSnapshot {
    pub process: RegistryProcess,
    pub lifecycle: Vec<LifecycleEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub registry_id: Option<crate::domain::RegistryId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupReport {
    pub removed_processes: usize,
    pub removed_events: usize,
}

#[async_trait]
pub trait ProcessStorage: Send + Sync {
    async fn save_snapshot(&self, snapshot: ProcessSnapshot) -> Result<()>;
    async fn load_snapshots(&self) -> Result<Vec<ProcessSnapshot>>;
    async fn save_event(&self, event: LifecycleEvent) -> Result<()>;
    /// Newest-first, with paging via `EventQuery::limit`/`offset`.
    async fn load_events(&self, query: EventQuery) -> Result<Vec<LifecycleEvent>>;
    async fn cleanup(
        &self,
        process_retention_date: DateTime<Utc>,
        event_retention_date: DateTime<Utc>,
    ) -> Result<CleanupReport>;
    /// Clears all state; used by `restore` for an atomic rehydration.
    async fn clear(&self) -> Result<()>;
}
