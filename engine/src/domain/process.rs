//! Process value objects: the adapter's view (`ProcessInfo`) and the
//! registry's view (`RegistryProcess`), plus the process status enum and the
//! symbolic signal names used across lifecycle control operations.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, stable identifier for a `RegistryProcess`.
///
/// Stable across updates for the same pid while that pid is continuously
/// observed; a later registration of the same pid after it disappears
/// allocates a brand new one (spec.md §9, open question b).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryId(Uuid);

impl RegistryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for RegistryId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Process status as reported by the platform adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    Running,
    Stopped,
    Error,
    Starting,
    Stopping,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// Symbolic signal names mapped by the platform adapter to OS signal
/// numbers. `suspendProcess` sends `Stop`; `resumeProcess` sends `Cont`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Term,
    Kill,
    Stop,
    Cont,
    Hup,
    Int,
    Usr1,
    Usr2,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Term => "TERM",
            Self::Kill => "KILL",
            Self::Stop => "STOP",
            Self::Cont => "CONT",
            Self::Hup => "HUP",
            Self::Int => "INT",
            Self::Usr1 => "USR1",
            Self::Usr2 => "USR2",
        };
        write!(f, "{}", s)
    }
}

/// The platform adapter's view of one OS process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub user: Option<String>,
    /// CPU percent in [0, 100].
    pub cpu: f32,
    /// Resident memory in bytes.
    pub memory: u64,
    /// Virtual memory size in bytes.
    pub vsz: u64,
    /// Resident set size in bytes (usually equal to `memory`).
    pub rss: u64,
    pub start_time: DateTime<Utc>,
    pub status: ProcessStatus,
}

/// The registry's view of one OS process: extends `ProcessInfo` with
/// bookkeeping the registry alone owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryProcess {
    pub registry_id: RegistryId,
    pub info: ProcessInfo,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub seen_count: u64,
    pub is_managed: bool,
    pub tags: HashSet<String>,
}

impl RegistryProcess {
    pub fn new(registry_id: RegistryId, info: ProcessInfo, now: DateTime<Utc>) -> Self {
        Self {
            registry_id,
            info,
            first_seen: now,
            last_seen: now,
            seen_count: 1,
            is_managed: false,
            tags: HashSet::new(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.info.pid
    }
}
