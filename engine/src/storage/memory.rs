//! In-memory `ProcessStorage` implementation. The only implementation
//! required by spec.md §6; the port is designed so a persistent backend can
//! be swapped in without touching callers.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{LifecycleEvent, Result};
use crate::ports::process_storage::{CleanupReport, EventQuery, ProcessSnapshot, ProcessStorage};

#[derive(Default)]
pub struct InMemoryStorage {
    snapshots: Mutex<Vec<ProcessSnapshot>>,
    events: Mutex<Vec<LifecycleEvent>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessStorage for InMemoryStorage {
    async fn save_snapshot(&self, snapshot: ProcessSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.retain(|s| s.process.registry_id != snapshot.process.registry_id);
        snapshots.push(snapshot);
        Ok(())
    }

    async fn load_snapshots(&self) -> Result<Vec<ProcessSnapshot>> {
        Ok(self.snapshots.lock().unwrap().clone())
    }

    async fn save_event(&self, event: LifecycleEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn load_events(&self, query: EventQuery) -> Result<Vec<LifecycleEvent>> {
        let events = self.events.lock().unwrap();
        let mut matched: Vec<LifecycleEvent> = events
            .iter()
            .filter(|e| {
                if let Some(registry_id) = query.registry_id {
                    if e.registry_id != registry_id {
                        return false;
                    }
                }
                if let Some(since) = query.since {
                    if e.timestamp < since {
                        return false;
                    }
                }
                if let Some(until) = query.until {
                    if e.timestamp > until {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let paged = matched.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => paged.take(limit).collect(),
            None => paged.collect(),
        })
    }

    async fn cleanup(
        &self,
        process_retention_date: DateTime<Utc>,
        event_retention_date: DateTime<Utc>,
    ) -> Result<CleanupReport> {
        let mut snapshots = self.snapshots.lock().unwrap();
        let before = snapshots.len();
        snapshots.retain(|s| s.process.last_seen >= process_retention_date);
        let removed_processes = before - snapshots.len();

        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.timestamp >= event_retention_date);
        let removed_events = before - events.len();

        Ok(CleanupReport {
            removed_processes,
            removed_events,
        })
    }

    async fn clear(&self) -> Result<()> {
        self.snapshots.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
        Ok(())
    }
}
