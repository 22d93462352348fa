//! In-process broadcast bus shared by every tab
//!
//! Each tab connects once and gets a `BusPort`. A port never sees its own
//! frames, only those posted by other ports.

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::message::{LockMessage, TabId};
use crate::error::{CoreError, CoreResult};

const DEFAULT_CAPACITY: usize = 256;

/// Raw frame as carried by the bus
#[derive(Debug, Clone)]
pub struct Frame {
    pub origin: TabId,
    pub bytes: Vec<u8>,
}

/// Origin-scoped publish/subscribe channel
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<Frame>,
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastBus {
    /// Create a bus buffering up to `capacity` frames per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Join the bus as a new tab
    pub fn connect(&self) -> BusPort {
        let tab_id = format!("tab-{}", &Uuid::new_v4().to_string()[..8]);
        self.connect_as(tab_id)
    }

    /// Join the bus with a chosen tab id
    pub fn connect_as(&self, tab_id: impl Into<TabId>) -> BusPort {
        BusPort {
            tab_id: tab_id.into(),
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
        }
    }

    /// Number of connected ports
    pub fn port_count(&self) -> usize {
        self.tx.receiver_count()
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, origin: &str, bytes: Vec<u8>) {
        let _ = self.tx.send(Frame {
            origin: origin.to_string(),
            bytes,
        });
    }
}

/// One tab's connection to the bus
#[derive(Debug)]
pub struct BusPort {
    tab_id: TabId,
    tx: broadcast::Sender<Frame>,
    rx: broadcast::Receiver<Frame>,
}

impl BusPort {
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    /// Publish a message to every other port
    pub fn post(&self, message: &LockMessage) -> CoreResult<()> {
        let bytes = message.encode()?;
        debug!(
            "{} -> {:?} {}",
            self.tab_id, message.kind, message.file_id
        );
        self.tx
            .send(Frame {
                origin: self.tab_id.clone(),
                bytes,
            })
            .map(|_| ())
            .map_err(|_| CoreError::CoordinatorClosed)
    }

    /// Wait for the next message from another port
    ///
    /// Undecodable frames are dropped. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<LockMessage> {
        loop {
            match self.rx.recv().await {
                Ok(frame) if frame.origin == self.tab_id => continue,
                Ok(frame) => match LockMessage::decode(&frame.bytes) {
                    Ok(message) => {
                        debug!(
                            "{} <- {:?} {} from {}",
                            self.tab_id, message.kind, message.file_id, frame.origin
                        );
                        return Some(message);
                    }
                    Err(e) => {
                        warn!("Dropping undecodable frame from {}: {}", frame.origin, e);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{} lagged behind the bus, {} frames lost", self.tab_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
