//! Fixed-order, space separated layout: `date time LEVEL client text`.
//!
//! The server receipt time is not part of this format, and client names
//! must not contain spaces.

use super::{FormatError, LogMessageFormatter, format_timestamp, parse_timestamp};
use crate::log_message::LogMessage;

#[derive(Clone, Copy, Debug, Default)]
pub struct CompetitionFormatter;

impl LogMessageFormatter for CompetitionFormatter {
    fn serialize(&self, message: &LogMessage) -> String {
        format!(
            "{} {} {} {}",
            format_timestamp(Some(message.occurred_at())),
            message.level(),
            message.client_name(),
            message.text()
        )
    }

    fn parse(&self, record: &str) -> Result<LogMessage, FormatError> {
        let parts: Vec<&str> = record.splitn(5, ' ').collect();
        let &[date, time, level, client, text] = parts.as_slice() else {
            return Err(FormatError::Malformed(format!(
                "expected 5 space separated fields, found {}",
                parts.len()
            )));
        };
        let occurred = parse_timestamp(&format!("{date} {time}"))?;
        Ok(LogMessage::with_timestamp(occurred, client, level.parse()?, text))
    }
}
