//! Mock platform adapter: generates/accepts synthetic process data. Used for
//! tests and development, and as the fallback when no real adapter is
//! available for the host OS (spec.md §4.1).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{ProcessInfo, ProcessStatus, Result, Signal, SystemMetrics};
use crate::ports::PlatformAdapter;

#[derive(Default)]
pub struct MockAdapter {
    processes: Mutex<HashMap<u32, ProcessInfo>>,
    metrics: Mutex<Option<SystemMetrics>>,
    killed: Mutex<Vec<(u32, Signal)>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entire synthetic process table.
    pub fn set_processes(&self, processes: Vec<ProcessInfo>) {
        let mut guard = self.processes.lock().unwrap();
        guard.clear();
        for p in processes {
            guard.insert(p.pid, p);
        }
    }

    pub fn upsert_process(&self, process: ProcessInfo) {
        self.processes.lock().unwrap().insert(process.pid, process);
    }

    pub fn remove_process(&self, pid: u32) {
        self.processes.lock().unwrap().remove(&pid);
    }

    pub fn set_cpu(&self, pid: u32, cpu: f32) {
        if let Some(p) = self.processes.lock().unwrap().get_mut(&pid) {
            p.cpu = cpu;
        }
    }

    pub fn set_memory(&self, pid: u32, memory: u64) {
        if let Some(p) = self.processes.lock().unwrap().get_mut(&pid) {
            p.memory = memory;
            p.rss = memory;
        }
    }

    pub fn set_status(&self, pid: u32, status: ProcessStatus) {
        if let Some(p) = self.processes.lock().unwrap().get_mut(&pid) {
            p.status = status;
        }
    }

    pub fn set_system_metrics(&self, metrics: SystemMetrics) {
        *self.metrics.lock().unwrap() = Some(metrics);
    }

    pub fn signals_received(&self) -> Vec<(u32, Signal)> {
        self.killed.lock().unwrap().clone()
    }

    fn synthetic_metrics() -> SystemMetrics {
        SystemMetrics {
            timestamp: Utc::now(),
            cpu_percent: 0.0,
            cpu_per_core: vec![0.0; 1],
            load_average_1: 0.0,
            load_average_5: 0.0,
            load_average_15: 0.0,
            memory_total: 8 * 1024 * 1024 * 1024,
            memory_used: 0,
            swap_total: 0,
            swap_used: 0,
            disk_read_bytes_per_sec: 0,
            disk_write_bytes_per_sec: 0,
            disk_utilization_percent: 0.0,
        }
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    async fn get_process_list(&self) -> Result<Vec<ProcessInfo>> {
        Ok(self.processes.lock().unwrap().values().cloned().collect())
    }

    async fn get_process_info(&self, pid: u32) -> Result<Option<ProcessInfo>> {
        Ok(self.processes.lock().unwrap().get(&pid).cloned())
    }

    async fn get_system_metrics(&self) -> Result<SystemMetrics> {
        let metrics = self.metrics.lock().unwrap().clone();
        Ok(metrics.unwrap_or_else(Self::synthetic_metrics))
    }

    async fn kill_process(&self, pid: u32, signal: Signal) -> Result<()> {
        self.killed.lock().unwrap().push((pid, signal));
        match signal {
            Signal::Stop => self.set_status(pid, ProcessStatus::Stopping),
            Signal::Cont => self.set_status(pid, ProcessStatus::Running),
            _ => {
                self.processes.lock().unwrap().remove(&pid);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pid: u32) -> ProcessInfo {
        ProcessInfo {
            pid,
            ppid: None,
            name: "web".to_string(),
            command: "/usr/bin/web".to_string(),
            args: vec![],
            user: Some("root".to_string()),
            cpu: 0.0,
            memory: 0,
            vsz: 0,
            rss: 0,
            start_time: Utc::now(),
            status: ProcessStatus::Running,
        }
    }

    #[tokio::test]
    async fn list_is_safe_to_call_repeatedly() {
        let adapter = MockAdapter::new();
        adapter.set_processes(vec![sample(100)]);
        assert_eq!(adapter.get_process_list().await.unwrap().len(), 1);
        assert_eq!(adapter.get_process_list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn kill_with_term_removes_the_process() {
        let adapter = MockAdapter::new();
        adapter.set_processes(vec![sample(100)]);
        adapter.kill_process(100, Signal::Term).await.unwrap();
        assert!(adapter.get_process_info(100).await.unwrap().is_none());
        assert_eq!(adapter.signals_received(), vec![(100, Signal::Term)]);
    }

    #[tokio::test]
    async fn suspend_and_resume_toggle_status() {
        let adapter = MockAdapter::new();
        adapter.set_processes(vec![sample(100)]);
        adapter.suspend_process(100).await.unwrap();
        assert_eq!(
            adapter.get_process_info(100).await.unwrap().unwrap().status,
            ProcessStatus::Stopping
        );
        adapter.resume_process(100).await.unwrap();
        assert_eq!(
            adapter.get_process_info(100).await.unwrap().unwrap().status,
            ProcessStatus::Running
        );
    }
}
