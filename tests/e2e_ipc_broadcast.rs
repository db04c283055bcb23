//! E6 (spec.md §8): broadcast delivery to every registered process, and a
//! request/response call against an unregistered target timing out.

mod common;

use std::time::Duration;

use supervisor_engine::domain::SupervisorError;

#[tokio::test]
async fn broadcast_delivers_to_every_registered_process() {
    let harness = common::default_harness();

    let proc_a = harness.supervisor.register_process_for_ipc(100);
    let proc_b = harness.supervisor.register_process_for_ipc(200);

    let delivered = harness
        .supervisor
        .broadcast_ipc_message(serde_json::json!({"type": "ping"}));
    assert_eq!(delivered, 2);

    let connections = harness.supervisor.get_ipc_connections();
    assert!(connections.contains(&proc_a));
    assert!(connections.contains(&proc_b));
}

#[tokio::test]
async fn request_to_a_process_with_no_responder_times_out() {
    let harness = common::default_harness();
    let proc_a = harness.supervisor.register_process_for_ipc(100);

    let result = harness
        .supervisor
        .request_ipc_response(&proc_a, serde_json::json!({"type": "ping"}), Duration::from_millis(200))
        .await;

    assert!(matches!(result, Err(SupervisorError::IpcTimeout(_))));
}

#[tokio::test]
async fn unregistered_process_is_dropped_from_broadcast_count() {
    let harness = common::default_harness();
    let proc_a = harness.supervisor.register_process_for_ipc(100);
    let _proc_b = harness.supervisor.register_process_for_ipc(200);

    harness.supervisor.unregister_process_from_ipc(&proc_a);

    let delivered = harness
        .supervisor
        .broadcast_ipc_message(serde_json::json!({"type": "ping"}));
    assert_eq!(delivered, 1);
}
