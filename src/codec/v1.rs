//! Version 1 frame body.
//!
//! ```text
//! [4 bytes: level ordinal]  -1 means "no value"
//! [8 bytes: occurredAt, epoch millis]
//! [4 bytes: clientName length][clientName bytes]
//! [4 bytes: text length][text bytes]
//! ```

use std::io::Read;

use chrono::DateTime;

use super::{
    DecodeLimits,
    error::{CodecError, Field, MalformedMessage},
    read_exact_field,
};
use crate::{level::LogLevel, log_message::LogMessage};

pub(super) const VERSION: u16 = 1;

const NO_LEVEL: i32 = -1;

pub(super) fn encode_body(message: &LogMessage, buf: &mut Vec<u8>) {
    buf.extend(message.level().ordinal().to_be_bytes());
    buf.extend(message.occurred_at().timestamp_millis().to_be_bytes());
    put_string(buf, message.client_name());
    put_string(buf, message.text());
}

fn put_string(buf: &mut Vec<u8>, value: &str) {
    // Lengths are bounded by `super::validate` before encoding.
    let len = value.len() as u32;
    buf.extend(len.to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}

pub(super) fn decode_body<R: Read>(
    reader: &mut R,
    limits: DecodeLimits,
) -> Result<LogMessage, CodecError> {
    let ordinal = i32::from_be_bytes(read_array(reader, Field::Level)?);
    let millis = i64::from_be_bytes(read_array(reader, Field::OccurredAt)?);
    let client_name = read_bytes(reader, Field::ClientName, limits)?;
    let text = read_bytes(reader, Field::Text, limits)?;

    // The whole frame has been consumed; everything below is recoverable.
    let level = match ordinal {
        NO_LEVEL => return Err(MalformedMessage::MissingLevel.into()),
        other => LogLevel::from_ordinal(other).ok_or(MalformedMessage::LevelOutOfRange(other))?,
    };
    let occurred_at = DateTime::from_timestamp_millis(millis)
        .ok_or(MalformedMessage::TimestampOutOfRange(millis))?;
    let client_name = into_utf8(client_name, Field::ClientName)?;
    if client_name.is_empty() {
        return Err(MalformedMessage::EmptyClientName.into());
    }
    let text = into_utf8(text, Field::Text)?;
    Ok(LogMessage::with_timestamp(occurred_at, client_name, level, text))
}

fn read_array<R: Read, const N: usize>(reader: &mut R, field: Field) -> Result<[u8; N], CodecError> {
    let mut buf = [0u8; N];
    read_exact_field(reader, &mut buf, field)?;
    Ok(buf)
}

fn read_bytes<R: Read>(
    reader: &mut R,
    field: Field,
    limits: DecodeLimits,
) -> Result<Vec<u8>, CodecError> {
    let declared = i32::from_be_bytes(read_array(reader, field)?);
    let len = usize::try_from(declared)
        .map_err(|_| MalformedMessage::NegativeLength { field, len: declared })?;
    if len > limits.max_field_len {
        return Err(MalformedMessage::FieldTooLarge {
            field,
            len,
            max: limits.max_field_len,
        }
        .into());
    }
    let mut bytes = vec![0u8; len];
    read_exact_field(reader, &mut bytes, field)?;
    Ok(bytes)
}

fn into_utf8(bytes: Vec<u8>, field: Field) -> Result<String, MalformedMessage> {
    String::from_utf8(bytes).map_err(|_| MalformedMessage::InvalidUtf8 { field })
}
