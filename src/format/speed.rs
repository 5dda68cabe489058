//! Single-line delimited layout; cheapest to produce and parse.
//!
//! The message text is the final field and runs to the end of the record,
//! so it may itself contain the delimiter.

use super::{
    FormatError, LogMessageFormatter, format_timestamp, parse_optional_timestamp, parse_timestamp,
    split_field,
};
use crate::log_message::LogMessage;

const DELIMITER: &str = " ||| ";

#[derive(Clone, Copy, Debug, Default)]
pub struct SpeedFormatter;

impl LogMessageFormatter for SpeedFormatter {
    fn serialize(&self, message: &LogMessage) -> String {
        format!(
            "ReceivedAt: {}{DELIMITER}Timestamp: {}{DELIMITER}Client-Name: {}{DELIMITER}Log-Level: {}{DELIMITER}Message: {}",
            format_timestamp(message.received_at_server()),
            format_timestamp(Some(message.occurred_at())),
            message.client_name(),
            message.level(),
            message.text(),
        )
    }

    fn parse(&self, record: &str) -> Result<LogMessage, FormatError> {
        let rest = record
            .strip_prefix("ReceivedAt: ")
            .ok_or(FormatError::MissingField("ReceivedAt"))?;
        let (received, rest) = split_field(rest, " ||| Timestamp: ", "Timestamp")?;
        let (occurred, rest) = split_field(rest, " ||| Client-Name: ", "Client-Name")?;
        let (client, rest) = split_field(rest, " ||| Log-Level: ", "Log-Level")?;
        let (level, text) = split_field(rest, " ||| Message: ", "Message")?;
        Ok(
            LogMessage::with_timestamp(parse_timestamp(occurred)?, client, level.parse()?, text)
                .received_at(parse_optional_timestamp(received)?),
        )
    }
}
