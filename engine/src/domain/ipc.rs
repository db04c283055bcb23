//! IPC contract surface (spec.md §6): message shapes and priorities used by
//! the supervisor to coordinate with managed worker processes. Transport is
//! out of scope; these are the wire-level types an in-memory broker (or a
//! future real transport) exchanges.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IpcPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for IpcPriority {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcMessage {
    pub id: Uuid,
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
    pub target_id: Option<String>,
    pub channel_id: String,
    pub priority: IpcPriority,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcRequest {
    #[serde(flatten)]
    pub message: IpcMessage,
    pub expects_response: bool,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub request_id: Uuid,
    pub success: bool,
    pub payload: Option<Value>,
    pub error: Option<String>,
}

/// Identifier allocated to a process registered for IPC: `process-<pid>`.
pub fn process_ipc_id(pid: u32) -> String {
    format!("process-{pid}")
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
