use crate::error::{ErgcastError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Start-of-frame delimiter
pub const FRAME_START: u8 = 0xF1;

/// End-of-frame delimiter
pub const FRAME_END: u8 = 0xF2;

/// Escape marker for payload bytes that collide with a delimiter
pub const FRAME_ESCAPE: u8 = 0xF3;

/// First byte value that must be escaped (`0xF0..=0xF3`)
const ESCAPE_RANGE_START: u8 = 0xF0;

/// Whether `byte` must be byte-stuffed inside a frame
#[must_use]
pub const fn needs_escape(byte: u8) -> bool {
    byte >= ESCAPE_RANGE_START && byte <= FRAME_ESCAPE
}

/// Append `byte` to `dst`, stuffing it as `0xF3, byte & 0x03` when needed
pub fn put_escaped(dst: &mut BytesMut, byte: u8) {
    if needs_escape(byte) {
        dst.put_u8(FRAME_ESCAPE);
        dst.put_u8(byte & 0x03);
    } else {
        dst.put_u8(byte);
    }
}

/// Byte-stuff every byte of `data`
#[must_use]
pub fn escape(data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(data.len() * 2);
    for &byte in data {
        put_escaped(&mut buf, byte);
    }
    buf.freeze()
}

/// Reverse [`escape`]
///
/// # Errors
///
/// Returns [`ErgcastError::InvalidEscape`] if an escape marker is the last byte
/// or is followed by a value above `0x03`.
pub fn unescape(data: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(data.len());
    let mut iter = data.iter().enumerate();

    while let Some((offset, &byte)) = iter.next() {
        if byte != FRAME_ESCAPE {
            buf.put_u8(byte);
            continue;
        }

        match iter.next() {
            Some((_, &value)) if value <= 0x03 => buf.put_u8(ESCAPE_RANGE_START | value),
            _ => return Err(ErgcastError::InvalidEscape { offset }),
        }
    }

    Ok(buf.freeze())
}

/// XOR-fold of `data`
#[must_use]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Build a response frame ready for notification
///
/// Layout: `0xF1, escaped payload, escaped checksum, 0xF2`. The checksum is
/// computed over the payload before escaping.
#[must_use]
pub fn build_response_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() * 2 + 4);

    buf.put_u8(FRAME_START);
    for &byte in payload {
        put_escaped(&mut buf, byte);
    }
    put_escaped(&mut buf, checksum(payload));
    buf.put_u8(FRAME_END);

    buf.freeze()
}

/// Validated command extracted from a complete control-channel frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Unescaped payload, checksum removed
    pub payload: Bytes,
    /// Checksum byte carried by the frame
    pub checksum: u8,
}

impl Command {
    /// Validate a raw frame and extract its payload
    ///
    /// The frame must start with [`FRAME_START`] and end with [`FRAME_END`]; the
    /// last unescaped byte before the end delimiter is the checksum, and it must
    /// equal the XOR-fold of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ErgcastError::MalformedFrame`] for missing delimiters or an empty
    /// body, [`ErgcastError::InvalidEscape`] for bad stuffing and
    /// [`ErgcastError::ChecksumMismatch`] when the checksum does not verify.
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        if frame.len() < 3 {
            return Err(ErgcastError::MalformedFrame(format!(
                "Frame too short: {} bytes",
                frame.len()
            )));
        }

        if frame[0] != FRAME_START {
            return Err(ErgcastError::MalformedFrame(format!(
                "Frame starts with {:02X}, expected {FRAME_START:02X}",
                frame[0]
            )));
        }

        let last = frame[frame.len() - 1];
        if last != FRAME_END {
            return Err(ErgcastError::MalformedFrame(format!(
                "Frame ends with {last:02X}, expected {FRAME_END:02X}"
            )));
        }

        let body = &frame[1..frame.len() - 1];
        if body.contains(&FRAME_START) || body.contains(&FRAME_END) {
            return Err(ErgcastError::MalformedFrame(
                "Unescaped delimiter inside frame".to_string(),
            ));
        }

        let mut payload = unescape(body)?;
        if payload.is_empty() {
            return Err(ErgcastError::MalformedFrame(
                "Frame has no checksum".to_string(),
            ));
        }
        let received = payload.split_off(payload.len() - 1)[0];

        let computed = checksum(&payload);
        if computed != received {
            return Err(ErgcastError::ChecksumMismatch { received, computed });
        }

        Ok(Self {
            payload,
            checksum: received,
        })
    }
}
