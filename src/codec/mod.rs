//! Binary framing for [`LogMessage`] values.
//!
//! Every frame starts with a big-endian `u16` format version followed by a
//! version-specific body. The decoder dispatches strictly on that version so
//! older body layouts keep decoding as long as their module stays registered
//! in [`decode_with_limits`]. `received_at_server` is never transmitted.

mod error;
mod v1;


use std::io::{self, Read, Write};

pub use error::{CodecError, Field, MalformedMessage};

use crate::log_message::LogMessage;

/// Version written by [`encode`].
pub const FORMAT_VERSION: u16 = v1::VERSION;
/// Default upper bound for a single string field, in bytes.
pub const DEFAULT_MAX_FIELD_LEN: usize = 1 << 20; // 1 MiB

/// Bounds applied while decoding untrusted input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_field_len: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }
}

/// Check that `message` can be framed and will be accepted by a peer using
/// the default limits.
pub fn validate(message: &LogMessage) -> Result<(), MalformedMessage> {
    if message.client_name().is_empty() {
        return Err(MalformedMessage::EmptyClientName);
    }
    for (field, value) in [
        (Field::ClientName, message.client_name()),
        (Field::Text, message.text()),
    ] {
        if value.len() > DEFAULT_MAX_FIELD_LEN {
            return Err(MalformedMessage::FieldTooLarge {
                field,
                len: value.len(),
                max: DEFAULT_MAX_FIELD_LEN,
            });
        }
    }
    Ok(())
}

/// Encode a message into a complete frame.
pub fn encode(message: &LogMessage) -> Result<Vec<u8>, MalformedMessage> {
    validate(message)?;
    let capacity = 2 + 4 + 8 + 4 + message.client_name().len() + 4 + message.text().len();
    let mut buf = Vec::with_capacity(capacity);
    buf.extend(FORMAT_VERSION.to_be_bytes());
    v1::encode_body(message, &mut buf);
    Ok(buf)
}

/// Encode `message` and write the frame to `writer`, flushing afterwards.
pub fn write_frame<W: Write>(writer: &mut W, message: &LogMessage) -> io::Result<()> {
    let frame = encode(message).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    writer.write_all(&frame)?;
    writer.flush()
}

/// Read one frame from `reader` using the default limits.
pub fn decode<R: Read>(reader: &mut R) -> Result<LogMessage, CodecError> {
    decode_with_limits(reader, DecodeLimits::default())
}

/// Read one frame from `reader`.
///
/// Returns [`CodecError::Closed`] when the stream ends before the first byte
/// of a frame, and a [`MalformedMessage::Truncated`] failure when it ends
/// part-way through one.
pub fn decode_with_limits<R: Read>(
    reader: &mut R,
    limits: DecodeLimits,
) -> Result<LogMessage, CodecError> {
    let version = read_version(reader)?;
    match version {
        v1::VERSION => v1::decode_body(reader, limits),
        other => Err(MalformedMessage::UnknownVersion(other).into()),
    }
}

fn read_version<R: Read>(reader: &mut R) -> Result<u16, CodecError> {
    let mut buf = [0u8; 2];
    loop {
        match reader.read(&mut buf[..1]) {
            Ok(0) => return Err(CodecError::Closed),
            Ok(_) => break,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(CodecError::Io(err)),
        }
    }
    read_exact_field(reader, &mut buf[1..], Field::Version)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_exact_field<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    field: Field,
) -> Result<(), CodecError> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => MalformedMessage::Truncated { field }.into(),
        _ => CodecError::Io(err),
    })
}
