//! In-process transport pair for tests and simulation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Inbound, Opened, Transport, INBOUND_QUEUE};
use crate::error::TransportError;

pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    closed: AtomicBool,
}

/// The far end of a memory transport.
pub struct MemoryPeer {
    /// Everything the link wrote, one entry per `send`.
    pub sent: mpsc::UnboundedReceiver<Bytes>,
    /// Feed bytes or a close to the link's reader side.
    pub inject: mpsc::Sender<Inbound>,
}

impl MemoryPeer {
    pub async fn deliver(&self, bytes: impl Into<Bytes>) -> bool {
        self.inject
            .send(Inbound::Data {
                bytes: bytes.into(),
                from: None,
            })
            .await
            .is_ok()
    }

    /// Simulate the remote end going away.
    pub async fn hang_up(&self, error: Option<&str>) {
        let _ = self
            .inject
            .send(Inbound::Closed {
                error: error.map(str::to_string),
            })
            .await;
    }
}

pub fn memory_pair() -> (Opened, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::channel(INBOUND_QUEUE);
    let transport = MemoryTransport {
        outbound: out_tx,
        closed: AtomicBool::new(false),
    };
    (
        Opened {
            transport: Arc::new(transport),
            inbound: in_rx,
        },
        MemoryPeer {
            sent: out_rx,
            inject: in_tx,
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
