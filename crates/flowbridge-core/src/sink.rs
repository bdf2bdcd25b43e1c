//! Client-facing frame channel
//!
//! A bounded channel of encoded frames. Awaited sends throttle the upstream
//! read loop to the client's pace.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::BridgeError;

/// Sending half of a client's frame channel
#[derive(Clone, Debug)]
pub struct FrameSink {
    tx: mpsc::Sender<Bytes>,
}

impl FrameSink {
    /// Create a sink and the receiver the HTTP layer streams from
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Write one frame, failing once the client has gone
    pub async fn send(&self, frame: Bytes) -> Result<(), BridgeError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when the client drops its receiver
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}
