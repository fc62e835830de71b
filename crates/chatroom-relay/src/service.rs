//! Relay service — a single task that owns the [`Relay`] and applies events
//! from every connection in arrival order

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::{ConnectionId, MessageType};
use crate::relay::{Relay, RelayEvent, RelayStats};
use crate::rooms::Outbox;

/// Work items accepted by the relay task
#[derive(Debug)]
pub enum RelayCommand {
    Event(RelayEvent),
    Snapshot(oneshot::Sender<RelayStats>),
}

/// Cloneable handle that connections use to feed the relay task
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayCommand>,
}

impl RelayHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<RelayCommand>) -> Self {
        Self { tx }
    }

    pub fn connect(&self, connection_id: ConnectionId, outbox: Outbox) {
        self.send(RelayEvent::Connect {
            connection_id,
            outbox,
        });
    }

    pub fn join(&self, connection_id: ConnectionId, user_name: String, room_name: String) {
        self.send(RelayEvent::Join {
            connection_id,
            user_name,
            room_name,
        });
    }

    pub fn message(&self, connection_id: ConnectionId, content: String, message_type: MessageType) {
        self.send(RelayEvent::Message {
            connection_id,
            content,
            message_type,
        });
    }

    pub fn disconnect(&self, connection_id: ConnectionId) {
        self.send(RelayEvent::Disconnect { connection_id });
    }

    /// Ask the relay task for its counters. `None` once the task has stopped.
    pub async fn stats(&self) -> Option<RelayStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(RelayCommand::Snapshot(reply_tx)).ok()?;
        reply_rx.await.ok()
    }

    fn send(&self, event: RelayEvent) {
        // The relay only stops during shutdown; late events are irrelevant then
        if self.tx.send(RelayCommand::Event(event)).is_err() {
            debug!("Relay stopped, event discarded");
        }
    }
}

/// Spawn the relay task. It runs until `cancel` fires or every handle is dropped.
pub fn spawn(relay: Relay, cancel: CancellationToken) -> (RelayHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(relay, rx, cancel));
    (RelayHandle::new(tx), task)
}

async fn run(
    mut relay: Relay,
    mut rx: mpsc::UnboundedReceiver<RelayCommand>,
    cancel: CancellationToken,
) {
    info!("Relay started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Relay shutting down");
                break;
            }
            command = rx.recv() => {
                match command {
                    Some(RelayCommand::Event(event)) => relay.handle(event),
                    Some(RelayCommand::Snapshot(reply)) => {
                        let _ = reply.send(relay.stats());
                    }
                    None => {
                        info!("All relay handles dropped");
                        break;
                    }
                }
            }
        }
    }
}
