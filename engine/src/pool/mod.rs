//! Worker Pool and Pool Manager subsystem (spec.md §4.7, §4.8).

pub mod balancer;
pub mod manager;
pub mod queue;
pub mod worker_pool;

pub use manager::{PoolManager, WorkloadHint};
pub use worker_pool::{PoolMetrics, WorkerPool};
