//! Domain-level errors
//! These represent business rule violations and contract failures, not
//! incidental infrastructure plumbing.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SupervisorError {
    #[error("process '{0}' not found")]
    ProcessNotFound(String),

    #[error("platform adapter failure: {0}")]
    AdapterFailure(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("registry validation failed: {0}")]
    RegistryValidation(String),

    #[error("restart already in progress for {0}")]
    RestartInProgress(String),

    #[error("restart rate limited for {0}: {1} attempts already made within the window")]
    RestartRateLimited(String, u32),

    #[error("restart failed for {0}: {1}")]
    RestartFailure(String, String),

    #[error("health check error: {0}")]
    HealthCheckError(String),

    #[error("health check timed out after {0:?}")]
    HealthCheckTimeout(std::time::Duration),

    #[error("pool '{0}' not found")]
    PoolNotFound(String),

    #[error("pool '{0}' queue is full ({1} tasks)")]
    PoolQueueFull(String, usize),

    #[error("task '{0}' timed out after {1:?}")]
    TaskTimeout(String, std::time::Duration),

    #[error("worker '{0}' is unhealthy")]
    WorkerUnhealthy(String),

    #[error("invalid supervision configuration: {0}")]
    SupervisionConfig(String),

    #[error("IPC connection error: {0}")]
    IpcConnection(String),

    #[error("IPC request to '{0}' timed out")]
    IpcTimeout(String),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
