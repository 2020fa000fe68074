use crate::{
    error::{ErgcastError, Result},
    protocol::{FRAME_END, FRAME_START},
    types::FramingConfig,
};
use bytes::{Bytes, BytesMut};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Reassembles control-channel writes into complete frames
///
/// BLE centrals split commands across several writes when they exceed the MTU.
/// A chunk starting with [`FRAME_START`] discards whatever was buffered; a chunk
/// ending with [`FRAME_END`] completes the frame. The buffer is bounded by
/// [`FramingConfig::max_frame_len`] and dropped after
/// [`FramingConfig::idle_timeout_ms`] without new chunks.
///
/// One assembler belongs to one connection.
#[derive(Debug)]
pub struct CommandFrameAssembler {
    buffer: BytesMut,
    config: FramingConfig,
    last_chunk_at: Option<Instant>,
}

impl CommandFrameAssembler {
    /// Create an assembler with the given bounds
    #[must_use]
    pub fn new(config: FramingConfig) -> Self {
        Self {
            buffer: BytesMut::with_capacity(config.max_frame_len),
            config,
            last_chunk_at: None,
        }
    }

    /// Bytes of the unfinished frame currently buffered
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one write chunk, returning the raw frame once it is complete
    ///
    /// # Errors
    ///
    /// Returns [`ErgcastError::FrameTooLong`] if the chunk would push the partial
    /// frame past the configured bound. The partial frame is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Bytes>> {
        self.push_at(chunk, Instant::now())
    }

    /// [`Self::push`] with an explicit arrival time
    ///
    /// # Errors
    ///
    /// See [`Self::push`].
    pub fn push_at(&mut self, chunk: &[u8], now: Instant) -> Result<Option<Bytes>> {
        let (Some(&first), Some(&last)) = (chunk.first(), chunk.last()) else {
            return Ok(None);
        };

        if first == FRAME_START {
            if !self.buffer.is_empty() {
                debug!(
                    "Discarding {} bytes of unfinished frame",
                    self.buffer.len()
                );
            }
            self.buffer.clear();
        } else if self.is_stale(now) {
            warn!(
                "Dropping {} bytes of partial frame after {}ms idle",
                self.buffer.len(),
                self.config.idle_timeout_ms
            );
            self.buffer.clear();
        }

        self.last_chunk_at = Some(now);

        let len = self.buffer.len() + chunk.len();
        if len > self.config.max_frame_len {
            self.reset();
            return Err(ErgcastError::FrameTooLong {
                len,
                max: self.config.max_frame_len,
            });
        }

        self.buffer.extend_from_slice(chunk);

        if last == FRAME_END {
            let frame = self.buffer.split().freeze();
            debug!("Assembled frame: {:02X?}", &frame[..]);
            self.last_chunk_at = None;
            return Ok(Some(frame));
        }

        Ok(None)
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_chunk_at = None;
    }

    fn is_stale(&self, now: Instant) -> bool {
        match self.last_chunk_at {
            Some(at) if !self.buffer.is_empty() => {
                now.saturating_duration_since(at) > self.config.idle_timeout()
            }
            _ => false,
        }
    }
}

impl Default for CommandFrameAssembler {
    fn default() -> Self {
        Self::new(FramingConfig::default())
    }
}
