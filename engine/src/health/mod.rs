//! Health Check Engine and Health Monitor (spec.md §4.4, §4.6).

pub mod checks;
pub mod monitor;

pub use checks::{HealthCheckEngine, SustainedBreach};
pub use monitor::{HealthMonitor, HealthMonitorConfig, HealthTransition};
