//! `<logMessage>` element per message with escaped text content.

use super::{FormatError, LogMessageFormatter, format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::log_message::LogMessage;

#[derive(Clone, Copy, Debug, Default)]
pub struct XmlFormatter;

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn element<'a>(record: &'a str, tag: &'static str) -> Result<&'a str, FormatError> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = record.find(&open).ok_or(FormatError::MissingField(tag))? + open.len();
    let len = record[start..]
        .find(&close)
        .ok_or(FormatError::MissingField(tag))?;
    Ok(&record[start..start + len])
}

impl LogMessageFormatter for XmlFormatter {
    fn serialize(&self, message: &LogMessage) -> String {
        format!(
            "<logMessage><receivedAt>{}</receivedAt><timestamp>{}</timestamp><clientName>{}</clientName><logLevel>{}</logLevel><message>{}</message></logMessage>",
            format_timestamp(message.received_at_server()),
            format_timestamp(Some(message.occurred_at())),
            escape(message.client_name()),
            message.level(),
            escape(message.text()),
        )
    }

    fn parse(&self, record: &str) -> Result<LogMessage, FormatError> {
        let received = parse_optional_timestamp(element(record, "receivedAt")?)?;
        let occurred = parse_timestamp(element(record, "timestamp")?)?;
        let client = unescape(element(record, "clientName")?);
        let level = element(record, "logLevel")?.parse()?;
        let text = unescape(element(record, "message")?);
        Ok(LogMessage::with_timestamp(occurred, client, level, text).received_at(received))
    }
}
