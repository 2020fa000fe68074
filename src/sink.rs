use crate::error::{ErgcastError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Destination for encoded bytes: the ANT radio or a BLE notify characteristic
///
/// Implementations must either accept the write or fail without blocking the
/// caller indefinitely. Failed writes are not retried.
#[async_trait]
pub trait ByteSink: Send + Sync {
    /// Write one complete message or frame
    ///
    /// # Errors
    ///
    /// Returns [`ErgcastError::Sink`] if the underlying transport rejects the write.
    async fn write(&self, bytes: Bytes) -> Result<()>;
}

/// Sink that forwards writes into an unbounded channel
///
/// Bridges the protocol engines to a transport running elsewhere, such as a
/// GATT server task or a USB writer thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Bytes>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ByteSink for ChannelSink {
    async fn write(&self, bytes: Bytes) -> Result<()> {
        self.sender
            .send(bytes)
            .map_err(|_| ErgcastError::Sink("receiver dropped".to_string()))
    }
}
