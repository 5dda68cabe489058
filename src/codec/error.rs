//! Failure taxonomy for frame encoding and decoding.

use std::{fmt, io};

use thiserror::Error;

/// Frame field a failure refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Version,
    Level,
    OccurredAt,
    ClientName,
    Text,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Version => "version",
            Field::Level => "level",
            Field::OccurredAt => "occurredAt",
            Field::ClientName => "clientName",
            Field::Text => "text",
        })
    }
}

/// A frame that does not describe a valid message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MalformedMessage {
    #[error("unknown frame version {0}")]
    UnknownVersion(u16),
    #[error("level ordinal {0} is out of range")]
    LevelOutOfRange(i32),
    #[error("frame carries no level")]
    MissingLevel,
    #[error("negative length {len} declared for {field}")]
    NegativeLength { field: Field, len: i32 },
    #[error("{field} length {len} exceeds the limit of {max} bytes")]
    FieldTooLarge { field: Field, len: usize, max: usize },
    #[error("stream ended inside {field}")]
    Truncated { field: Field },
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: Field },
    #[error("client name is empty")]
    EmptyClientName,
    #[error("timestamp {0} ms is out of range")]
    TimestampOutOfRange(i64),
}

impl MalformedMessage {
    /// Whether the stream is still positioned on a frame boundary after this
    /// failure, so the reader may skip the frame and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MalformedMessage::LevelOutOfRange(_)
                | MalformedMessage::MissingLevel
                | MalformedMessage::InvalidUtf8 { .. }
                | MalformedMessage::EmptyClientName
                | MalformedMessage::TimestampOutOfRange(_)
        )
    }
}

/// Errors produced while reading a frame from a stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The peer closed the stream cleanly on a frame boundary.
    #[error("stream closed")]
    Closed,
    #[error(transparent)]
    Malformed(#[from] MalformedMessage),
    #[error("i/o error on frame stream: {0}")]
    Io(#[from] io::Error),
}
