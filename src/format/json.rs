//! JSON object per message, via `serde_json`.

use serde::{Deserialize, Serialize};

use super::{FormatError, LogMessageFormatter, format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::log_message::LogMessage;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonRecord {
    received_at: String,
    timestamp: String,
    client_name: String,
    log_level: String,
    message: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonFormatter;

impl LogMessageFormatter for JsonFormatter {
    fn serialize(&self, message: &LogMessage) -> String {
        let record = JsonRecord {
            received_at: format_timestamp(message.received_at_server()),
            timestamp: format_timestamp(Some(message.occurred_at())),
            client_name: message.client_name().to_owned(),
            log_level: message.level().to_string(),
            message: message.text().to_owned(),
        };
        // A struct of plain strings always serialises.
        serde_json::to_string(&record).unwrap_or_default()
    }

    fn parse(&self, record: &str) -> Result<LogMessage, FormatError> {
        let parsed: JsonRecord =
            serde_json::from_str(record).map_err(|err| FormatError::Malformed(err.to_string()))?;
        let received = parse_optional_timestamp(&parsed.received_at)?;
        let occurred = parse_timestamp(&parsed.timestamp)?;
        let level = parsed.log_level.parse()?;
        Ok(LogMessage::with_timestamp(occurred, parsed.client_name, level, parsed.message)
            .received_at(received))
    }
}
