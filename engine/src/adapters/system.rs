//! Real platform adapter backed by `sysinfo` for enumeration/metrics and
//! (on Unix) `nix` for signal delivery.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sysinfo::{Pid, System};

use crate::domain::{ProcessInfo, ProcessStatus, Result, Signal, SupervisorError, SystemMetrics};
use crate::ports::PlatformAdapter;

pub struct SystemAdapter {
    system: Mutex<System>,
}

impl SystemAdapter {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self {
            system: Mutex::new(system),
        }
    }

    fn to_process_info(pid: Pid, proc_: &sysinfo::Process) -> ProcessInfo {
        let start = DateTime::<Utc>::from_timestamp(proc_.start_time() as i64, 0)
            .unwrap_or_else(Utc::now);
        ProcessInfo {
            pid: pid.as_u32(),
            ppid: proc_.parent().map(|p| p.as_u32()),
            name: proc_.name().to_string_lossy().to_string(),
            command: proc_
                .exe()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| proc_.name().to_string_lossy().to_string()),
            args: proc_
                .cmd()
                .iter()
                .map(|a| a.to_string_lossy().to_string())
                .collect(),
            user: proc_.user_id().map(|u| u.to_string()),
            cpu: proc_.cpu_usage(),
            memory: proc_.memory(),
            vsz: proc_.virtual_memory(),
            rss: proc_.memory(),
            start_time: start,
            status: status_of(proc_),
        }
    }
}

fn status_of(proc_: &sysinfo::Process) -> ProcessStatus {
    use sysinfo::ProcessStatus as Raw;
    match proc_.status() {
        Raw::Run | Raw::Sleep | Raw::Idle => ProcessStatus::Running,
        Raw::Stop => ProcessStatus::Stopping,
        Raw::Zombie | Raw::Dead => ProcessStatus::Stopped,
        _ => ProcessStatus::Running,
    }
}

impl Default for SystemAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAdapter for SystemAdapter {
    async fn get_process_list(&self) -> Result<Vec<ProcessInfo>> {
        let mut system = self.system.lock().unwrap();
        system.refresh_all();
        Ok(system
            .processes()
            .iter()
            .map(|(pid, proc_)| Self::to_process_info(*pid, proc_))
            .collect())
    }

    async fn get_process_info(&self, pid: u32) -> Result<Option<ProcessInfo>> {
        let mut system = self.system.lock().unwrap();
        system.refresh_all();
        Ok(system
            .process(Pid::from_u32(pid))
            .map(|proc_| Self::to_process_info(Pid::from_u32(pid), proc_)))
    }

    async fn get_system_metrics(&self) -> Result<SystemMetrics> {
        let mut system = self.system.lock().unwrap();
        system.refresh_all();
        let load = System::load_average();
        let cpu_per_core: Vec<f32> = system.cpus().iter().map(|c| c.cpu_usage()).collect();
        let cpu_percent = if cpu_per_core.is_empty() {
            0.0
        } else {
            cpu_per_core.iter().sum::<f32>() / cpu_per_core.len() as f32
        };
        Ok(SystemMetrics {
            timestamp: Utc::now(),
            cpu_percent,
            cpu_per_core,
            load_average_1: load.one,
            load_average_5: load.five,
            load_average_15: load.fifteen,
            memory_total: system.total_memory(),
            memory_used: system.used_memory(),
            swap_total: system.total_swap(),
            swap_used: system.used_swap(),
            disk_read_bytes_per_sec: 0,
            disk_write_bytes_per_sec: 0,
            disk_utilization_percent: 0.0,
        })
    }

    #[cfg(unix)]
    async fn kill_process(&self, pid: u32, signal: Signal) -> Result<()> {
        use nix::sys::signal::{self, Signal as NixSignal};
        use nix::unistd::Pid as NixPid;

        let nix_signal = match signal {
            Signal::Term => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
            Signal::Stop => NixSignal::SIGSTOP,
            Signal::Cont => NixSignal::SIGCONT,
            Signal::Hup => NixSignal::SIGHUP,
            Signal::Int => NixSignal::SIGINT,
            Signal::Usr1 => NixSignal::SIGUSR1,
            Signal::Usr2 => NixSignal::SIGUSR2,
        };

        signal::kill(NixPid::from_raw(pid as i32), nix_signal).map_err(|errno| {
            if errno == nix::errno::Errno::EPERM {
                SupervisorError::PermissionDenied(format!(
                    "not permitted to signal pid {pid}: {errno}"
                ))
            } else {
                SupervisorError::AdapterFailure(format!("kill({pid}, {signal}) failed: {errno}"))
            }
        })
    }

    #[cfg(not(unix))]
    async fn kill_process(&self, _pid: u32, _signal: Signal) -> Result<()> {
        Err(SupervisorError::AdapterFailure(
            "signal delivery is only implemented on Unix".into(),
        ))
    }
}
