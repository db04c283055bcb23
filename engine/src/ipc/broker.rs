//! In-memory IPC broker (spec.md §6): message shapes and routing for
//! coordinating with registered worker processes. Transport is out of
//! scope — this broker delivers to in-process subscriber channels, which is
//! as far as the contract goes without a real wire protocol.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    process_ipc_id, IpcMessage, IpcPriority, IpcRequest, IpcResponse, Result, SupervisorError,
};

struct Connection {
    sender: mpsc::UnboundedSender<IpcMessage>,
}

#[derive(Default)]
pub struct IpcBroker {
    connections: Mutex<HashMap<String, Connection>>,
    pending_requests: Mutex<HashMap<Uuid, oneshot::Sender<IpcResponse>>>,
}

impl IpcBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pid` for IPC, returning its allocated `process-<pid>` id
    /// and the receiving half of its inbox.
    pub fn register_process(&self, pid: u32) -> (String, mpsc::UnboundedReceiver<IpcMessage>) {
        let process_id = process_ipc_id(pid);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .lock()
            .unwrap()
            .insert(process_id.clone(), Connection { sender: tx });
        (process_id, rx)
    }

    pub fn unregister_process(&self, process_id: &str) {
        self.connections.lock().unwrap().remove(process_id);
    }

    pub fn connections(&self) -> Vec<String> {
        self.connections.lock().unwrap().keys().cloned().collect()
    }

    /// Fire-and-forget send; succeeds as long as the target is registered.
    pub fn send_to_process(&self, target: &str, payload: Value) -> Result<()> {
        let message = IpcMessage {
            id: Uuid::new_v4(),
            message_type: "message".to_string(),
            timestamp: Utc::now(),
            sender_id: "supervisor".to_string(),
            target_id: Some(target.to_string()),
            channel_id: target.to_string(),
            priority: IpcPriority::Normal,
            payload,
        };
        self.deliver(target, message)
    }

    /// Request/response with a timeout; fails with `IpcTimeout` on expiry.
    pub async fn request_from_process(&self, target: &str, payload: Value, timeout: std::time::Duration) -> Result<IpcResponse> {
        let message = IpcMessage {
            id: Uuid::new_v4(),
            message_type: "request".to_string(),
            timestamp: Utc::now(),
            sender_id: "supervisor".to_string(),
            target_id: Some(target.to_string()),
            channel_id: target.to_string(),
            priority: IpcPriority::Normal,
            payload,
        };
        let request = IpcRequest {
            message,
            expects_response: true,
            timeout,
        };

        let (tx, rx) = oneshot::channel();
        self.pending_requests
            .lock()
            .unwrap()
            .insert(request.message.id, tx);

        self.deliver(target, request.message.clone())?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            _ => {
                self.pending_requests.lock().unwrap().remove(&request.message.id);
                Err(SupervisorError::IpcTimeout(target.to_string()))
            }
        }
    }

    /// Resolves a pending request, delivered by the target process.
    pub fn resolve_response(&self, response: IpcResponse) {
        if let Some(tx) = self.pending_requests.lock().unwrap().remove(&response.request_id) {
            let _ = tx.send(response);
        }
    }

    /// Best-effort broadcast to every registered process.
    pub fn broadcast(&self, payload: Value) -> usize {
        let targets = self.connections();
        let mut delivered = 0;
        for target in targets {
            let message = IpcMessage {
                id: Uuid::new_v4(),
                message_type: "broadcast".to_string(),
                timestamp: Utc::now(),
                sender_id: "supervisor".to_string(),
                target_id: None,
                channel_id: target.clone(),
                priority: IpcPriority::Normal,
                payload: payload.clone(),
            };
            if self.deliver(&target, message).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn deliver(&self, target: &str, message: IpcMessage) -> Result<()> {
        let connections = self.connections.lock().unwrap();
        let connection = connections
            .get(target)
            .ok_or_else(|| SupervisorError::IpcConnection(format!("unknown target {target}")))?;
        if connection.sender.send(message).is_err() {
            warn!(target, "ipc send failed: receiver dropped");
            return Err(SupervisorError::IpcConnection(format!(
                "target {target} inbox closed"
            )));
        }
        debug!(target, "ipc message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn send_to_unregistered_process_fails() {
        let broker = IpcBroker::new();
        let result = broker.send_to_process("process-1", json!({}));
        assert!(matches!(result, Err(SupervisorError::IpcConnection(_))));
    }

    #[tokio::test]
    async fn registered_process_receives_sent_message() {
        let broker = IpcBroker::new();
        let (process_id, mut rx) = broker.register_process(100);
        broker.send_to_process(&process_id, json!({"hello": "world"})).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.payload["hello"], "world");
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_process() {
        let broker = IpcBroker::new();
        let (_id1, mut rx1) = broker.register_process(100);
        let (_id2, mut rx2) = broker.register_process(200);
        let delivered = broker.broadcast(json!({"ping": true}));
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn request_without_response_times_out() {
        let broker = IpcBroker::new();
        let (_id, _rx) = broker.register_process(100);
        let result = broker
            .request_from_process("process-100", json!({}), std::time::Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(SupervisorError::IpcTimeout(_))));
    }
}
