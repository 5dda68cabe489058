//! The single entity exchanged between clients and the collector.
//!
//! A `LogMessage` is created by the producing client at log-call time. The
//! collector annotates it with `received_at_server` on arrival; nothing else
//! about the message ever changes afterwards.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, SubsecRound, Utc};

use crate::level::LogLevel;

/// Current wall-clock time truncated to the millisecond resolution used on
/// the wire and in the text formats.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[derive(Clone, Debug)]
pub struct LogMessage {
    occurred_at: DateTime<Utc>,
    received_at_server: Option<DateTime<Utc>>,
    client_name: String,
    level: LogLevel,
    text: String,
}

impl LogMessage {
    /// Create a message stamped with the current time.
    pub fn new(client_name: impl Into<String>, level: LogLevel, text: impl Into<String>) -> Self {
        Self::with_timestamp(now_millis(), client_name, level, text)
    }

    /// Create a message with an explicit creation time.
    pub fn with_timestamp(
        occurred_at: DateTime<Utc>,
        client_name: impl Into<String>,
        level: LogLevel,
        text: impl Into<String>,
    ) -> Self {
        Self {
            occurred_at: occurred_at.trunc_subsecs(3),
            received_at_server: None,
            client_name: client_name.into(),
            level,
            text: text.into(),
        }
    }

    /// Attach a server receipt time while building a message, e.g. when
    /// reloading persisted records.
    pub fn received_at(mut self, received: Option<DateTime<Utc>>) -> Self {
        self.received_at_server = received.map(|ts| ts.trunc_subsecs(3));
        self
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn received_at_server(&self) -> Option<DateTime<Utc>> {
        self.received_at_server
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Record the server receipt time.
    ///
    /// Returns `false` and leaves the message untouched when it was already
    /// stamped.
    pub fn stamp_received(&mut self, now: DateTime<Utc>) -> bool {
        if self.received_at_server.is_some() {
            return false;
        }
        self.received_at_server = Some(now.trunc_subsecs(3));
        true
    }
}

impl PartialEq for LogMessage {
    fn eq(&self, other: &Self) -> bool {
        self.occurred_at.timestamp_millis() == other.occurred_at.timestamp_millis()
            && self.client_name == other.client_name
            && self.text == other.text
            && self.level == other.level
    }
}

impl Eq for LogMessage {}

impl Hash for LogMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.occurred_at.timestamp_millis().hash(state);
        self.client_name.hash(state);
        self.text.hash(state);
        self.level.hash(state);
    }
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.occurred_at.format("%Y-%m-%dT%H:%M:%S"),
            self.level,
            self.text
        )
    }
}
