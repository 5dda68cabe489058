//! Text representations of [`LogMessage`] used by the persistence layer.
//!
//! Each format is a [`LogMessageFormatter`] whose only contract is round-trip
//! fidelity: `parse(serialize(m))` yields a message equal to `m` with the
//! same server receipt time. Formats are selected at runtime via
//! [`LogFormat`].

mod competition;
mod human;
mod json;
mod speed;
mod xml;

#[cfg(test)]
mod tests;

use std::{fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

use crate::{level::UnknownLevel, log_message::LogMessage};

pub use competition::CompetitionFormatter;
pub use human::HumanReadableFormatter;
pub use json::JsonFormatter;
pub use speed::SpeedFormatter;
pub use xml::XmlFormatter;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const NULL_TIMESTAMP: &str = "NULL";

/// Errors raised while parsing a formatted record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error(transparent)]
    InvalidLevel(#[from] UnknownLevel),
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Trait for turning messages into single records of text and back.
///
/// Implementors must be thread-safe so one formatter can serve every
/// session of a server.
pub trait LogMessageFormatter: Send + Sync {
    fn serialize(&self, message: &LogMessage) -> String;
    fn parse(&self, record: &str) -> Result<LogMessage, FormatError>;
}

impl LogMessageFormatter for Box<dyn LogMessageFormatter> {
    fn serialize(&self, message: &LogMessage) -> String {
        (**self).serialize(message)
    }

    fn parse(&self, record: &str) -> Result<LogMessage, FormatError> {
        (**self).parse(record)
    }
}

impl LogMessageFormatter for Arc<dyn LogMessageFormatter> {
    fn serialize(&self, message: &LogMessage) -> String {
        (**self).serialize(message)
    }

    fn parse(&self, record: &str) -> Result<LogMessage, FormatError> {
        (**self).parse(record)
    }
}

/// Identifier for the built-in formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    HumanReadable,
    Speed,
    #[default]
    Competition,
    Xml,
}

impl LogFormat {
    /// Build the formatter for this format.
    pub fn formatter(self) -> Box<dyn LogMessageFormatter> {
        match self {
            LogFormat::Json => Box::new(JsonFormatter),
            LogFormat::HumanReadable => Box::new(HumanReadableFormatter),
            LogFormat::Speed => Box::new(SpeedFormatter),
            LogFormat::Competition => Box::new(CompetitionFormatter),
            LogFormat::Xml => Box::new(XmlFormatter),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Json => "json",
            LogFormat::HumanReadable => "human-readable",
            LogFormat::Speed => "speed",
            LogFormat::Competition => "competition",
            LogFormat::Xml => "xml",
        })
    }
}

/// Returned when a format name is not recognised.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log format {0:?}; expected one of json, human-readable, speed, competition, xml")]
pub struct UnknownFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalised.as_str() {
            "json" => Ok(LogFormat::Json),
            "human-readable" | "human" => Ok(LogFormat::HumanReadable),
            "speed" | "speed-format" => Ok(LogFormat::Speed),
            "competition" => Ok(LogFormat::Competition),
            "xml" => Ok(LogFormat::Xml),
            _ => Err(UnknownFormat(s.to_owned())),
        }
    }
}

pub(crate) fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        None => NULL_TIMESTAMP.to_owned(),
    }
}

pub(crate) fn parse_optional_timestamp(raw: &str) -> Result<Option<DateTime<Utc>>, FormatError> {
    let raw = raw.trim();
    if raw == NULL_TIMESTAMP {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_PARSE_FORMAT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| FormatError::InvalidTimestamp(raw.to_owned()))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FormatError> {
    parse_optional_timestamp(raw)?.ok_or_else(|| FormatError::InvalidTimestamp(raw.to_owned()))
}

/// Split `input` at the first `separator`, naming `field` when it is absent.
pub(crate) fn split_field<'a>(
    input: &'a str,
    separator: &str,
    field: &'static str,
) -> Result<(&'a str, &'a str), FormatError> {
    input
        .split_once(separator)
        .ok_or(FormatError::MissingField(field))
}
