use thiserror::Error;

/// Errors raised by the ANT+ broadcaster and the BLE control channel
#[derive(Error, Debug)]
pub enum ErgcastError {
    /// Page rotation selected a page id the encoder does not know
    #[error("Unknown ANT+ page id: {page}")]
    UnknownPage {
        /// Page id found in the rotation table
        page: u8,
    },

    /// A page rotation table must contain at least one entry
    #[error("Page rotation table is empty")]
    EmptyRotation,

    /// Partial command frame grew past the configured bound
    #[error("Command frame too long: {len} bytes buffered, limit is {max}")]
    FrameTooLong {
        /// Bytes that would have been buffered
        len: usize,
        /// Configured maximum frame length
        max: usize,
    },

    /// Assembled frame is structurally invalid
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Escape marker followed by an invalid value, or at the end of the frame
    #[error("Invalid escape sequence at offset {offset}")]
    InvalidEscape {
        /// Offset of the escape marker within the frame body
        offset: usize,
    },

    /// Trailing checksum does not match the payload
    #[error("Checksum mismatch: frame carries {received:02X}, payload folds to {computed:02X}")]
    ChecksumMismatch {
        /// Checksum byte carried by the frame
        received: u8,
        /// Checksum computed over the unescaped payload
        computed: u8,
    },

    /// Radio or notification sink rejected a write
    #[error("Sink write failed: {0}")]
    Sink(String),

    /// Channel to the broadcast task is gone
    #[error("Broadcast task channel closed")]
    ChannelClosed,

    /// Broadcaster was started twice
    #[error("Broadcast scheduler is already running")]
    AlreadyRunning,

    /// Broadcaster was stopped while not running
    #[error("Broadcast scheduler is not running")]
    NotRunning,

    /// Broadcast task panicked or was aborted
    #[error("Broadcast task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ergcast operations
pub type Result<T> = std::result::Result<T, ErgcastError>;

impl ErgcastError {
    /// Check if this error came from framing or validating a BLE command
    #[must_use]
    pub const fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::FrameTooLong { .. }
                | Self::MalformedFrame(_)
                | Self::InvalidEscape { .. }
                | Self::ChecksumMismatch { .. }
        )
    }

    /// Check if the engine keeps running after this error
    ///
    /// Frame errors drop one command, page and sink errors drop one tick.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.is_frame_error() || matches!(self, Self::UnknownPage { .. } | Self::Sink(_))
    }
}
