//! Multi-line labelled layout meant for people reading the log file.

use super::{
    FormatError, LogMessageFormatter, format_timestamp, parse_optional_timestamp, parse_timestamp,
    split_field,
};
use crate::log_message::LogMessage;

const RECEIVED_AT: &str = "ReceivedAt: [";
const TIMESTAMP: &str = "]\nTimestamp: [";
const CLIENT_NAME: &str = "]\nClient-Name: [";
const LOG_LEVEL: &str = "]\nLog-Level: [";
const MESSAGE: &str = "]\nMessage: [";

#[derive(Clone, Copy, Debug, Default)]
pub struct HumanReadableFormatter;

impl LogMessageFormatter for HumanReadableFormatter {
    fn serialize(&self, message: &LogMessage) -> String {
        format!(
            "{RECEIVED_AT}{}{TIMESTAMP}{}{CLIENT_NAME}{}{LOG_LEVEL}{}{MESSAGE}{}]",
            format_timestamp(message.received_at_server()),
            format_timestamp(Some(message.occurred_at())),
            message.client_name(),
            message.level(),
            message.text(),
        )
    }

    fn parse(&self, record: &str) -> Result<LogMessage, FormatError> {
        let rest = record
            .strip_prefix(RECEIVED_AT)
            .ok_or(FormatError::MissingField("ReceivedAt"))?;
        let (received, rest) = split_field(rest, TIMESTAMP, "Timestamp")?;
        let (occurred, rest) = split_field(rest, CLIENT_NAME, "Client-Name")?;
        let (client, rest) = split_field(rest, LOG_LEVEL, "Log-Level")?;
        let (level, rest) = split_field(rest, MESSAGE, "Message")?;
        let text = rest
            .strip_suffix(']')
            .ok_or_else(|| FormatError::Malformed("unterminated message field".into()))?;
        Ok(
            LogMessage::with_timestamp(parse_timestamp(occurred)?, client, level.parse()?, text)
                .received_at(parse_optional_timestamp(received)?),
        )
    }
}
