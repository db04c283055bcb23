//! Shared test harness for black-box integration tests.
//!
//! These tests exercise `Supervisor` in-process against a shared
//! `MockAdapter` rather than spawning a daemon: the core has no driving
//! adapters of its own (see DESIGN.md's REDESIGN note), so the stable API
//! surface under test is the `Supervisor` struct directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use supervisor_engine::adapters::{AdapterSelection, MockAdapter};
use supervisor_engine::domain::{ProcessInfo, ProcessStatus};
use supervisor_engine::{Supervisor, SupervisorConfig};

/// A `Supervisor` wired to a `MockAdapter` the caller keeps a handle to, so
/// process state can be mutated mid-test without touching real processes.
pub struct Harness {
    pub supervisor: Arc<Supervisor>,
    pub adapter: Arc<MockAdapter>,
}

pub fn harness(config: SupervisorConfig) -> Harness {
    let adapter = Arc::new(MockAdapter::new());
    let config = SupervisorConfig {
        platform_adapter: AdapterSelection::Mock,
        ..config
    };
    let supervisor = Arc::new(
        Supervisor::with_adapter(config, adapter.clone() as Arc<dyn supervisor_engine::ports::PlatformAdapter>)
            .expect("valid test config"),
    );
    Harness { supervisor, adapter }
}

pub fn default_harness() -> Harness {
    harness(SupervisorConfig {
        monitor_system_metrics: false,
        enable_auto_restart: false,
        ..SupervisorConfig::default()
    })
}

pub fn sample_process(pid: u32, name: &str) -> ProcessInfo {
    ProcessInfo {
        pid,
        ppid: None,
        name: name.to_string(),
        command: format!("/usr/bin/{name}"),
        args: vec![],
        user: Some("root".to_string()),
        cpu: 1.0,
        memory: 16 * 1024 * 1024,
        vsz: 32 * 1024 * 1024,
        rss: 16 * 1024 * 1024,
        start_time: Utc::now(),
        status: ProcessStatus::Running,
    }
}

/// Polls `f` every `interval` until it returns `Some`, or panics after
/// `timeout` elapses. Used instead of a fixed sleep for timer-driven
/// subsystems (sync ticks, health ticks) so tests aren't flaky under load.
pub async fn wait_until<T, F: Fn() -> Option<T>>(timeout: Duration, interval: Duration, f: F) -> T {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = f() {
            return value;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition did not become true within {timeout:?}");
        }
        tokio::time::sleep(interval).await;
    }
}
