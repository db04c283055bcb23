//! Lifecycle events: the registry's append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::process::{ProcessStatus, RegistryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEventKind {
    Discovered,
    Updated,
    StatusChange,
    Disappeared,
    Reappeared,
    Managed,
    Unmanaged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_id: Uuid,
    pub registry_id: RegistryId,
    pub pid: u32,
    pub event: LifecycleEventKind,
    pub timestamp: DateTime<Utc>,
    pub previous_status: Option<ProcessStatus>,
    pub new_status: Option<ProcessStatus>,
    pub metadata: Option<Value>,
}

impl LifecycleEvent {
    pub fn new(
        registry_id: RegistryId,
        pid: u32,
        event: LifecycleEventKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            registry_id,
            pid,
            event,
            timestamp,
            previous_status: None,
            new_status: None,
            metadata: None,
        }
    }

    pub fn with_status_change(mut self, previous: ProcessStatus, new: ProcessStatus) -> Self {
        self.previous_status = Some(previous);
        self.new_status = Some(new);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
