//! Health Check Engine (spec.md §4.4): executes a single `HealthCheck`
//! against a process and produces a `HealthCheckResult`. Each variant is
//! dispatched independently; none of them mutate registry or management
//! state directly — that is `HealthMonitor`'s job.

use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    HealthCheck, HealthCheckKind, HealthCheckResult, HealthStatus, ProcessInfo, RegistryId,
};
use crate::ports::PlatformAdapter;

pub struct HealthCheckEngine {
    http_client: reqwest::Client,
}

impl Default for HealthCheckEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheckEngine {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    /// Runs `check` against `registry_id`/`pid`, given the current
    /// `ProcessInfo` (for the synchronous resource checks) and the
    /// adapter (for `processExists`, which needs a fresh lookup).
    ///
    /// `breach` is the caller's persisted `cpuUsage` sustained-window state
    /// for this check, if any; without it a single over-threshold reading
    /// is reported immediately (used by callers with no per-tick state to
    /// carry, e.g. ad hoc/one-off checks).
    pub async fn run(
        &self,
        registry_id: RegistryId,
        process: &ProcessInfo,
        check: &HealthCheck,
        adapter: &dyn PlatformAdapter,
        attempt: u32,
        breach: Option<&mut SustainedBreach>,
    ) -> HealthCheckResult {
        let started = Instant::now();
        let timeout = check.common().timeout;
        let outcome = tokio::time::timeout(timeout, self.execute(process, check, adapter, breach)).await;

        let (status, message, details) = match outcome {
            Ok(Ok((status, message, details))) => (status, message, details),
            Ok(Err(err)) => (HealthStatus::Error, Some(err), None),
            Err(_) => (
                HealthStatus::Timeout,
                Some(format!("health check exceeded {timeout:?}")),
                None,
            ),
        };

        let result = HealthCheckResult {
            check_id: Uuid::new_v4(),
            registry_id,
            pid: process.pid,
            kind: check.kind(),
            status,
            timestamp: Utc::now(),
            duration: started.elapsed(),
            attempt,
            message,
            details,
        };
        debug!(%registry_id, pid = process.pid, ?result.status, ?result.kind, "health check result");
        result
    }

    async fn execute(
        &self,
        process: &ProcessInfo,
        check: &HealthCheck,
        adapter: &dyn PlatformAdapter,
        breach: Option<&mut SustainedBreach>,
    ) -> Result<(HealthStatus, Option<String>, Option<serde_json::Value>), String> {
        match check {
            HealthCheck::ProcessExists { .. } => {
                let current = adapter
                    .get_process_info(process.pid)
                    .await
                    .map_err(|e| e.to_string())?;
                match current {
                    Some(found) if found.name == process.name => {
                        Ok((HealthStatus::Healthy, None, None))
                    }
                    Some(_) => Ok((
                        HealthStatus::Unhealthy,
                        Some(format!("pid {} now belongs to a different process", process.pid)),
                        None,
                    )),
                    None => Ok((
                        HealthStatus::Unhealthy,
                        Some(format!("pid {} no longer present", process.pid)),
                        None,
                    )),
                }
            }
            HealthCheck::CpuUsage {
                max_cpu_percent,
                sustained_duration,
                ..
            } => {
                let breaching = process.cpu > *max_cpu_percent;
                let sustained = match breach {
                    Some(state) => state.observe(breaching, Utc::now(), *sustained_duration),
                    None => breaching,
                };
                if sustained {
                    Ok((
                        HealthStatus::Unhealthy,
                        Some(format!(
                            "cpu {:.1}% exceeded max {:.1}% for at least {:?}",
                            process.cpu, max_cpu_percent, sustained_duration
                        )),
                        None,
                    ))
                } else {
                    Ok((HealthStatus::Healthy, None, None))
                }
            }
            HealthCheck::MemoryUsage {
                max_memory_mb,
                max_memory_percent,
                ..
            } => {
                let limit_bytes = max_memory_mb * 1024 * 1024;
                if process.memory > limit_bytes {
                    return Ok((
                        HealthStatus::Unhealthy,
                        Some(format!(
                            "memory {} bytes exceeds max {} MB",
                            process.memory, max_memory_mb
                        )),
                        None,
                    ));
                }
                if let Some(max_percent) = max_memory_percent {
                    let metrics = adapter.get_system_metrics().await.map_err(|e| e.to_string())?;
                    if metrics.memory_total > 0 {
                        let percent =
                            process.memory as f32 / metrics.memory_total as f32 * 100.0;
                        if percent > *max_percent {
                            return Ok((
                                HealthStatus::Unhealthy,
                                Some(format!(
                                    "memory {percent:.1}% of system exceeds max {max_percent:.1}%"
                                )),
                                None,
                            ));
                        }
                    }
                }
                Ok((HealthStatus::Healthy, None, None))
            }
            HealthCheck::HttpEndpoint {
                url,
                expected_status_code,
                expected_response,
                ..
            } => {
                let response = self
                    .http_client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| format!("request to {url} failed: {e}"))?;
                let status_code = response.status().as_u16();
                if status_code != *expected_status_code {
                    return Ok((
                        HealthStatus::Unhealthy,
                        Some(format!(
                            "expected status {expected_status_code}, got {status_code}"
                        )),
                        None,
                    ));
                }
                if let Some(expected) = expected_response {
                    let body = response.text().await.map_err(|e| e.to_string())?;
                    if !body.contains(expected.as_str()) {
                        return Ok((
                            HealthStatus::Unhealthy,
                            Some("response body did not contain expected text".to_string()),
                            None,
                        ));
                    }
                }
                Ok((HealthStatus::Healthy, None, None))
            }
            HealthCheck::CustomScript {
                script_path,
                args,
                working_directory,
                expected_exit_code,
                ..
            } => {
                let mut command = tokio::process::Command::new(script_path);
                command.args(args).stdout(Stdio::null()).stderr(Stdio::null());
                if let Some(dir) = working_directory {
                    command.current_dir(dir);
                }
                let status = command
                    .status()
                    .await
                    .map_err(|e| format!("failed to spawn {script_path}: {e}"))?;
                let code = status.code().unwrap_or(-1);
                if code == *expected_exit_code {
                    Ok((HealthStatus::Healthy, None, None))
                } else {
                    Ok((
                        HealthStatus::Unhealthy,
                        Some(format!("exit code {code}, expected {expected_exit_code}")),
                        None,
                    ))
                }
            }
        }
    }
}

/// Sliding-window helper for `cpuUsage`'s `sustainedDuration`: a process is
/// only unhealthy once it has stayed over the threshold continuously for
/// at least this long, tracked by the caller across ticks.
#[derive(Debug, Clone, Copy)]
pub struct SustainedBreach {
    pub since: Option<chrono::DateTime<Utc>>,
}

impl Default for SustainedBreach {
    fn default() -> Self {
        Self { since: None }
    }
}

impl SustainedBreach {
    /// Call once per tick with whether the instantaneous reading breaches
    /// the threshold. Returns true once the breach has lasted `duration`.
    pub fn observe(&mut self, breaching: bool, now: chrono::DateTime<Utc>, duration: Duration) -> bool {
        if !breaching {
            self.since = None;
            return false;
        }
        let since = *self.since.get_or_insert(now);
        let elapsed = now - since;
        elapsed.to_std().map(|d| d >= duration).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use crate::domain::{HealthCheckCommon, ProcessStatus};

    fn process(pid: u32, cpu: f32, memory: u64) -> ProcessInfo {
        ProcessInfo {
            pid,
            ppid: None,
            name: "web".into(),
            command: "/bin/web".into(),
            args: vec![],
            user: Some("root".into()),
            cpu,
            memory,
            vsz: memory,
            rss: memory,
            start_time: Utc::now(),
            status: ProcessStatus::Running,
        }
    }

    #[tokio::test]
    async fn process_exists_check_reports_healthy_when_adapter_knows_the_pid() {
        let adapter = MockAdapter::new();
        adapter.set_processes(vec![process(100, 1.0, 1024)]);
        let engine = HealthCheckEngine::new();
        let check = HealthCheck::ProcessExists {
            common: HealthCheckCommon::default(),
        };
        let result = engine
            .run(
                RegistryId::generate(),
                &process(100, 1.0, 1024),
                &check,
                &adapter,
                0,
                None,
            )
            .await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn process_exists_check_reports_unhealthy_when_pid_gone() {
        let adapter = MockAdapter::new();
        let engine = HealthCheckEngine::new();
        let check = HealthCheck::ProcessExists {
            common: HealthCheckCommon::default(),
        };
        let result = engine
            .run(
                RegistryId::generate(),
                &process(100, 1.0, 1024),
                &check,
                &adapter,
                0,
                None,
            )
            .await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn cpu_usage_check_ignores_a_single_brief_spike() {
        let adapter = MockAdapter::new();
        let engine = HealthCheckEngine::new();
        let check = HealthCheck::CpuUsage {
            common: HealthCheckCommon::default(),
            max_cpu_percent: 50.0,
            sustained_duration: Duration::from_secs(5),
        };
        let mut breach = SustainedBreach::default();
        let result = engine
            .run(
                RegistryId::generate(),
                &process(100, 90.0, 1024),
                &check,
                &adapter,
                0,
                Some(&mut breach),
            )
            .await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn cpu_usage_check_flags_a_breach_sustained_past_the_window() {
        let adapter = MockAdapter::new();
        let engine = HealthCheckEngine::new();
        let check = HealthCheck::CpuUsage {
            common: HealthCheckCommon::default(),
            max_cpu_percent: 50.0,
            sustained_duration: Duration::from_millis(10),
        };
        let mut breach = SustainedBreach::default();
        let registry_id = RegistryId::generate();
        let proc = process(100, 90.0, 1024);

        let first = engine
            .run(registry_id, &proc, &check, &adapter, 0, Some(&mut breach))
            .await;
        assert_eq!(first.status, HealthStatus::Healthy);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = engine
            .run(registry_id, &proc, &check, &adapter, 0, Some(&mut breach))
            .await;
        assert_eq!(second.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn cpu_usage_check_without_persisted_breach_state_reports_instantly() {
        let adapter = MockAdapter::new();
        let engine = HealthCheckEngine::new();
        let check = HealthCheck::CpuUsage {
            common: HealthCheckCommon::default(),
            max_cpu_percent: 50.0,
            sustained_duration: Duration::from_secs(5),
        };
        let result = engine
            .run(
                RegistryId::generate(),
                &process(100, 90.0, 1024),
                &check,
                &adapter,
                0,
                None,
            )
            .await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn sustained_breach_requires_continuous_observation() {
        let mut breach = SustainedBreach::default();
        let t0 = Utc::now();
        assert!(!breach.observe(true, t0, Duration::from_secs(10)));
        assert!(!breach.observe(true, t0 + chrono::Duration::seconds(5), Duration::from_secs(10)));
        assert!(breach.observe(true, t0 + chrono::Duration::seconds(11), Duration::from_secs(10)));
    }

    #[test]
    fn sustained_breach_resets_on_recovery() {
        let mut breach = SustainedBreach::default();
        let t0 = Utc::now();
        breach.observe(true, t0, Duration::from_secs(10));
        assert!(!breach.observe(false, t0 + chrono::Duration::seconds(5), Duration::from_secs(10)));
        assert!(!breach.observe(
            true,
            t0 + chrono::Duration::seconds(6),
            Duration::from_secs(10)
        ));
    }
}
