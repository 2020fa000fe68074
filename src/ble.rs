use crate::{
    assembler::CommandFrameAssembler,
    control::{CommandDispatcher, ControlCommand},
    error::Result,
    protocol::Command,
    sink::ByteSink,
    types::FramingConfig,
};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Expand a 16-bit PM5 identifier into its 128-bit UUID
///
/// PM5 services and characteristics all share the base
/// `ce06xxxx-43e5-11e4-916c-0800200c9a66`.
#[must_use]
pub const fn pm5_uuid(short: u16) -> Uuid {
    Uuid::from_u128(0xce06_0000_43e5_11e4_916c_0800_200c_9a66 | ((short as u128) << 96))
}

/// Control channel of one BLE connection
///
/// Write chunks from the control receive characteristic go through frame
/// assembly, checksum validation and dispatch; responses are written to the
/// connection's notify sink. Every connection needs its own channel, nothing
/// is shared between centrals.
pub struct ControlChannel {
    assembler: CommandFrameAssembler,
    dispatcher: CommandDispatcher,
    sink: Arc<dyn ByteSink>,
    events: Option<mpsc::UnboundedSender<ControlCommand>>,
}

impl ControlChannel {
    /// Create a channel notifying responses through `sink`
    #[must_use]
    pub fn new(config: FramingConfig, sink: Arc<dyn ByteSink>) -> Self {
        Self {
            assembler: CommandFrameAssembler::new(config),
            dispatcher: CommandDispatcher::new(),
            sink,
            events: None,
        }
    }

    /// Also forward every recognized command to `events`
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ControlCommand>) -> Self {
        self.events = Some(events);
        self
    }

    /// Handle one write to the control receive characteristic
    ///
    /// Returns the command that was answered, if the chunk completed a valid,
    /// known command.
    ///
    /// # Errors
    ///
    /// Returns a frame error (see [`crate::ErgcastError::is_frame_error`]) when the
    /// completed frame is oversize, malformed or fails its checksum; the frame is
    /// dropped without a response. Returns the sink error if the response cannot
    /// be notified; the command has already been forwarded to the event channel
    /// by then.
    pub async fn on_write(&mut self, chunk: &[u8]) -> Result<Option<ControlCommand>> {
        let Some(frame) = self.assembler.push(chunk)? else {
            return Ok(None);
        };

        let command = Command::from_frame(&frame)?;
        let Some(dispatch) = self.dispatcher.dispatch(&command) else {
            return Ok(None);
        };

        if let Some(events) = &self.events {
            if events.send(dispatch.command).is_err() {
                debug!("Control event receiver dropped");
            }
        }

        self.sink.write(dispatch.response).await?;

        Ok(Some(dispatch.command))
    }

    /// Drive the channel from a stream of write chunks until it ends
    pub async fn run<S>(mut self, mut writes: S)
    where
        S: Stream<Item = Bytes> + Unpin,
    {
        info!("Control channel opened");

        while let Some(chunk) = writes.next().await {
            match self.on_write(&chunk).await {
                Ok(Some(command)) => info!("Answered control command: {}", command),
                Ok(None) => {}
                Err(e) if e.is_frame_error() => warn!("Discarding command frame: {}", e),
                Err(e) => error!("Control channel response failed: {}", e),
            }
        }

        info!("Control channel closed");
    }
}
