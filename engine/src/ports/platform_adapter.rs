//! Platform Adapter port (spec.md §4.1): the narrow abstraction the core
//! uses to touch the OS. Operations are fallible and never panic or throw
//! across this boundary.

use async_trait::async_trait;

use crate::domain::{ProcessInfo, Result, Signal, SystemMetrics};

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// A full process-list snapshot. Must be safe to call repeatedly.
    async fn get_process_list(&self) -> Result<Vec<ProcessInfo>>;

    /// Look up a single process by pid.
    async fn get_process_info(&self, pid: u32) -> Result<Option<ProcessInfo>>;

    async fn get_system_metrics(&self) -> Result<SystemMetrics>;

    async fn kill_process(&self, pid: u32, signal: Signal) -> Result<()>;

    async fn suspend_process(&self, pid: u32) -> Result<()> {
        self.kill_process(pid, Signal::Stop).await
    }

    async fn resume_process(&self, pid: u32) -> Result<()> {
        self.kill_process(pid, Signal::Cont).await
    }
}
