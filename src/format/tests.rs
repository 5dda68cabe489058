//! Tests for the text formats.

use chrono::{DateTime, TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::level::LogLevel;

fn occurred() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 5, 10, 15, 30).unwrap() + chrono::Duration::milliseconds(123)
}

fn received() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 5, 10, 15, 31).unwrap() + chrono::Duration::milliseconds(7)
}

#[fixture]
fn stamped() -> LogMessage {
    LogMessage::with_timestamp(occurred(), "client-1", LogLevel::Warning, "disk <nearly> full & hot")
        .received_at(Some(received()))
}

#[rstest]
#[case(LogFormat::Json)]
#[case(LogFormat::HumanReadable)]
#[case(LogFormat::Speed)]
#[case(LogFormat::Xml)]
fn formats_preserve_receipt_time(#[case] format: LogFormat, stamped: LogMessage) {
    let formatter = format.formatter();
    let parsed = formatter.parse(&formatter.serialize(&stamped)).expect("parse");
    assert_eq!(parsed, stamped);
    assert_eq!(parsed.received_at_server(), Some(received()));
}

#[rstest]
#[case(LogFormat::Json)]
#[case(LogFormat::HumanReadable)]
#[case(LogFormat::Speed)]
#[case(LogFormat::Xml)]
#[case(LogFormat::Competition)]
fn unset_receipt_time_survives(#[case] format: LogFormat) {
    let message = LogMessage::with_timestamp(occurred(), "c", LogLevel::Debug, "hi");
    let formatter = format.formatter();
    let parsed = formatter.parse(&formatter.serialize(&message)).expect("parse");
    assert_eq!(parsed, message);
    assert_eq!(parsed.received_at_server(), None);
}

#[rstest]
fn competition_layout(stamped: LogMessage) {
    assert_eq!(
        CompetitionFormatter.serialize(&stamped),
        "2024-12-05 10:15:30.123 WARNING client-1 disk <nearly> full & hot"
    );
}

#[rstest]
fn speed_layout_and_delimiter_in_text() {
    let message = LogMessage::with_timestamp(occurred(), "c", LogLevel::Info, "a ||| b");
    let line = SpeedFormatter.serialize(&message);
    assert_eq!(
        line,
        "ReceivedAt: NULL ||| Timestamp: 2024-12-05 10:15:30.123 ||| Client-Name: c ||| Log-Level: INFO ||| Message: a ||| b"
    );
    assert_eq!(SpeedFormatter.parse(&line).expect("parse").text(), "a ||| b");
}

#[rstest]
fn human_readable_layout(stamped: LogMessage) {
    let text = HumanReadableFormatter.serialize(&stamped);
    assert_eq!(
        text,
        "ReceivedAt: [2024-12-05 10:15:31.007]\nTimestamp: [2024-12-05 10:15:30.123]\nClient-Name: [client-1]\nLog-Level: [WARNING]\nMessage: [disk <nearly> full & hot]"
    );
}

#[rstest]
fn xml_escapes_markup(stamped: LogMessage) {
    let xml = XmlFormatter.serialize(&stamped);
    assert!(xml.contains("<message>disk &lt;nearly&gt; full &amp; hot</message>"));
}

#[rstest]
fn json_quotes_are_preserved() {
    let message = LogMessage::with_timestamp(occurred(), "c", LogLevel::Error, r#"say "hi""#);
    let json = JsonFormatter.serialize(&message);
    assert_eq!(JsonFormatter.parse(&json).expect("parse").text(), r#"say "hi""#);
}

#[rstest]
#[case(LogFormat::Speed, "ReceivedAt: NULL ||| Timestamp: nope ||| Client-Name: c ||| Log-Level: INFO ||| Message: x")]
#[case(LogFormat::Competition, "2024-12-05 10:15:30.123 LOUD c text")]
#[case(LogFormat::Competition, "too short")]
#[case(LogFormat::Json, "{not json")]
#[case(LogFormat::Xml, "<logMessage><timestamp>2024-12-05 10:15:30.123</timestamp></logMessage>")]
#[case(LogFormat::HumanReadable, "Message: [x]")]
fn rejects_garbage(#[case] format: LogFormat, #[case] input: &str) {
    assert!(format.formatter().parse(input).is_err());
}

#[rstest]
fn missing_field_is_named() {
    let err = SpeedFormatter
        .parse("ReceivedAt: NULL ||| Timestamp: 2024-12-05 10:15:30.123")
        .expect_err("incomplete");
    assert_eq!(err, FormatError::MissingField("Client-Name"));
}

#[rstest]
#[case("json", LogFormat::Json)]
#[case("HUMAN_READABLE", LogFormat::HumanReadable)]
#[case("speed_format", LogFormat::Speed)]
#[case(" competition ", LogFormat::Competition)]
#[case("xml", LogFormat::Xml)]
fn format_names_parse(#[case] name: &str, #[case] expected: LogFormat) {
    assert_eq!(name.parse::<LogFormat>(), Ok(expected));
}

#[rstest]
fn unknown_format_name_is_rejected() {
    assert!("yaml".parse::<LogFormat>().is_err());
}
