//! E1 (spec.md §8): discovery, seen-count tracking, and dead-process reaping
//! across successive sync ticks.

mod common;

use std::time::Duration;

use supervisor_engine::SupervisorConfig;

use common::sample_process;

#[tokio::test]
async fn discovers_two_processes_then_reaps_the_removed_one() {
    let harness = common::default_harness();
    harness.adapter.set_processes(vec![
        sample_process(100, "web"),
        sample_process(200, "db"),
    ]);

    let report = harness.supervisor.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.discovered, 2);

    let all = harness.supervisor.get_process_list();
    assert_eq!(all.len(), 2);
    for process in &all {
        assert_eq!(process.seen_count, 1);
    }

    let db_id = harness
        .supervisor
        .get_process_list()
        .into_iter()
        .find(|p| p.pid() == 200)
        .unwrap()
        .registry_id;

    harness.adapter.remove_process(200);

    // Immediately after removal, last_seen is still within
    // deadProcessTimeout, so nothing is reaped yet.
    let report = harness.supervisor.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.disappeared, 0);
    assert_eq!(harness.supervisor.get_process_list().len(), 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let report = harness.supervisor.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.disappeared, 1);

    let remaining = harness.supervisor.get_process_list();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].pid(), 100);
    assert!(remaining.iter().all(|p| p.registry_id != db_id));
}

#[tokio::test]
async fn sync_with_short_dead_timeout_reaps_on_the_very_next_tick() {
    let mut config = SupervisorConfig::default();
    config.monitor_system_metrics = false;
    config.enable_auto_restart = false;
    config.sync.dead_process_timeout = Duration::from_millis(1);
    let harness = common::harness(config);

    harness.adapter.set_processes(vec![sample_process(300, "cache")]);
    harness.supervisor.trigger_sync().await.unwrap().unwrap();
    assert_eq!(harness.supervisor.get_process_list().len(), 1);

    harness.adapter.remove_process(300);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let report = harness.supervisor.trigger_sync().await.unwrap().unwrap();
    assert_eq!(report.disappeared, 1);
    assert!(harness.supervisor.get_process_list().is_empty());
}
