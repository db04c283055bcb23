//! Testable property 11 (spec.md §8): `restore(snapshot())` reproduces
//! every registered process, its tags, and its lifecycle history in a
//! freshly constructed registry, as the public API sees it.

use std::sync::Arc;

use supervisor_engine::domain::ProcessStatus;
use supervisor_engine::registry::ProcessRegistry;
use supervisor_engine::storage::InMemoryStorage;

use chrono::Utc;
use supervisor_engine::domain::ProcessInfo;

fn process(pid: u32, name: &str) -> ProcessInfo {
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

#[tokio::test]
async fn restoring_a_snapshot_reproduces_processes_tags_and_history() {
    let source = ProcessRegistry::new(Arc::new(InMemoryStorage::new()));

    let web_id = source.register_process(process(100, "web")).await;
    let db_id = source.register_process(process(200, "db")).await;
    source.tag_process(web_id, "frontend").unwrap();
    source.tag_process(db_id, "backend").unwrap();
    source.tag_process(db_id, "stateful").unwrap();

    source.update_process(web_id, process(100, "web")).await.unwrap();
    let mut crashed = process(200, "db");
    crashed.status = ProcessStatus::Error;
    source.update_process(db_id, crashed).await.unwrap();

    let snapshots = source.snapshot().await;
    assert_eq!(snapshots.len(), 2);

    let target = ProcessRegistry::new(Arc::new(InMemoryStorage::new()));
    target.restore(snapshots);

    assert_eq!(target.all().len(), 2);
    assert_eq!(target.get_by_pid(100).unwrap().registry_id, web_id);
    assert_eq!(target.get_by_pid(200).unwrap().registry_id, db_id);
    assert_eq!(target.get_processes_by_tag("frontend").len(), 1);
    assert_eq!(target.get_processes_by_tag("backend").len(), 1);
    assert_eq!(target.get_processes_by_tag("stateful").len(), 1);

    let restored_db = target.get(db_id).unwrap();
    assert_eq!(restored_db.info.status, ProcessStatus::Error);
}
