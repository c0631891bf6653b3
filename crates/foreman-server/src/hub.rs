use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use foreman_runtime::{Classified, OutboundMessage};
use foreman_types::EventEnvelope;

/// Client socket fan-out.
///
/// Each accepted socket gets the caller-provided `state_sync` first, then a
/// live feed of every outbound message. Slow or dead sockets drop without
/// affecting the rest; a heartbeat ping terminates sockets that stop
/// answering.
pub struct WsHub {
    outbound: broadcast::Sender<OutboundMessage>,
    shutdown: broadcast::Sender<()>,
    connections: AtomicUsize,
    heartbeat: Duration,
}

impl WsHub {
    pub fn new(outbound: broadcast::Sender<OutboundMessage>, heartbeat_ms: u64) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            outbound,
            shutdown,
            connections: AtomicUsize::new(0),
            heartbeat: Duration::from_millis(heartbeat_ms.max(1)),
        }
    }

    /// Send a message to every connected client. Returns the number of
    /// client queues it reached; zero receivers is not an error.
    pub fn broadcast(&self, message: OutboundMessage) -> usize {
        self.outbound.send(message).unwrap_or(0)
    }

    /// Wrap a classified envelope in the wire `event` shape and broadcast
    pub fn publish_classified_event(&self, classified: Classified, envelope: EventEnvelope) {
        self.broadcast(OutboundMessage::Event {
            workspace: classified.workspace,
            secondary_workspaces: classified.secondary_workspaces,
            envelope,
        });
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Terminate every socket and stop their heartbeats
    pub fn close(&self) {
        info!("hub closing; terminating client sockets");
        let _ = self.shutdown.send(());
    }

    /// Drive one accepted socket until it closes. `state_sync` is sent
    /// before anything else so a reconnecting client always recovers from
    /// the snapshot.
    pub async fn run_socket(self: Arc<Self>, mut socket: WebSocket, state_sync: OutboundMessage) {
        self.connections.fetch_add(1, Ordering::SeqCst);
        debug!(connections = self.connection_count(), "client connected");

        let mut rx = self.outbound.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick fires immediately; skip it so the ping
        // cadence starts one period after connect
        heartbeat.tick().await;
        let mut responsive = true;

        if send_json(&mut socket, &state_sync).await.is_err() {
            warn!("state_sync send failed; dropping socket");
            self.connections.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }

                incoming = socket.recv() => {
                    match incoming {
                        Some(Ok(Message::Pong(_))) => responsive = true,
                        Some(Ok(Message::Ping(data))) => {
                            if socket.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {
                            // No inbound command plane over the socket
                        }
                        Some(Err(err)) => {
                            debug!(error = %err, "socket receive error");
                            break;
                        }
                    }
                }

                broadcast_result = rx.recv() => {
                    match broadcast_result {
                        Ok(message) => {
                            if send_json(&mut socket, &message).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            // The client recovers on reconnect via the
                            // snapshot; dropping is better than buffering
                            warn!(missed, "client lagging; messages skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = heartbeat.tick() => {
                    if !responsive {
                        warn!("client missed heartbeat; terminating socket");
                        break;
                    }
                    responsive = false;
                    if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.connections.fetch_sub(1, Ordering::SeqCst);
        debug!(connections = self.connection_count(), "client disconnected");
    }
}

async fn send_json(
    socket: &mut WebSocket,
    message: &OutboundMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(text) => socket.send(Message::Text(text.into())).await,
        Err(err) => {
            warn!(error = %err, "outbound message failed to serialize; skipping");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_types::{AgentEvent, StatusEvent, WorkspaceTag};

    fn status_envelope() -> EventEnvelope {
        EventEnvelope::new(
            "ev-1",
            1,
            "run-1",
            AgentEvent::Status(StatusEvent {
                agent_id: "agent-1".to_string(),
                message: "working".to_string(),
                tick: None,
            }),
        )
    }

    #[test]
    fn test_broadcast_without_clients_is_not_an_error() {
        let (tx, _) = broadcast::channel(8);
        let hub = WsHub::new(tx, 30_000);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(
            hub.broadcast(OutboundMessage::DevServerStarted { pid: 1 }),
            0
        );
    }

    #[test]
    fn test_publish_classified_event_wraps_wire_shape() {
        let (tx, mut rx) = broadcast::channel(8);
        let hub = WsHub::new(tx, 30_000);

        hub.publish_classified_event(
            Classified {
                workspace: WorkspaceTag::Timeline,
                secondary_workspaces: vec![],
            },
            status_envelope(),
        );

        match rx.try_recv().unwrap() {
            OutboundMessage::Event { workspace, envelope, .. } => {
                assert_eq!(workspace, WorkspaceTag::Timeline);
                assert_eq!(envelope.source_event_id, "ev-1");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
