//! Domain model: pure data types, value objects, and the error taxonomy.
//! Nothing in this module performs I/O.

pub mod error;
pub mod health;
pub mod ipc;
pub mod lifecycle;
pub mod management;
pub mod metrics;
pub mod pool;
pub mod process;
pub mod query;
pub mod restart;

pub use error::{Result, SupervisorError};
pub use health::{
    BoundedHistory, HealthCheck, HealthCheckCommon, HealthCheckKind, HealthCheckResult,
    HealthStatus, OverallHealthStatus, ProcessHealthState, SystemHealthLevel, SystemHealthSummary,
};
pub use ipc::{process_ipc_id, IpcMessage, IpcPriority, IpcRequest, IpcResponse};
pub use lifecycle::{LifecycleEvent, LifecycleEventKind};
pub use management::{ManagedProcess, ManagementConfig};
pub use metrics::{AggregatedMetrics, SystemMetrics};
pub use pool::{LoadBalancingAlgorithm, Pool, PoolTask, ScalingStrategy, TaskState, Worker, WorkerState};
pub use process::{ProcessInfo, ProcessStatus, RegistryId, RegistryProcess, Signal};
pub use query::ProcessQuery;
pub use restart::{AutoRestartConfig, BackoffStrategy, RestartAttempt, RestartPolicy, RestartReason};
