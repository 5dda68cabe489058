//! Producer-side facade: a named [`Logger`] feeding a [`SendQueue`].
//!
//! [`LoggerFactory`] wires the usual stack together: a [`FileCache`] under
//! the cache directory, a [`BlockingSendQueue`] towards the collector and a
//! [`Logger`] applying the minimum level locally.

mod log_bridge;

#[cfg(test)]
mod tests;

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::debug;
use thiserror::Error;

use crate::{
    cache::FileCache,
    connection::{ConnectionConfig, ReconnectingConnection},
    level::LogLevel,
    log_message::LogMessage,
    send_queue::{BlockingSendQueue, DEFAULT_SEND_QUEUE_INTERVAL, SendQueue},
};

pub use log_bridge::LogBridge;

/// Directory holding per-client cache files unless overridden.
pub const DEFAULT_CACHE_DIR: &str = "./tmp";

/// Errors raised while building a [`Logger`].
#[derive(Debug, Error)]
pub enum LoggerSetupError {
    #[error("invalid destination {0:?}; expected host:port")]
    InvalidDestination(String),
    #[error("client name must not be empty")]
    EmptyClientName,
    #[error("client name {0:?} must not contain whitespace or path separators")]
    InvalidClientName(String),
    #[error("failed to open cache file {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Named message producer.
#[derive(Clone)]
pub struct Logger {
    client_name: String,
    min_level: Option<LogLevel>,
    queue: Arc<dyn SendQueue>,
}

impl Logger {
    pub fn new(
        queue: Arc<dyn SendQueue>,
        client_name: impl Into<String>,
        min_level: Option<LogLevel>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            min_level,
            queue,
        }
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn min_level(&self) -> Option<LogLevel> {
        self.min_level
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.min_level.is_none_or(|min| level >= min)
    }

    /// Stamp and enqueue a message unless `level` is below the minimum.
    pub fn log(&self, level: LogLevel, text: impl Into<String>) {
        if !self.is_enabled(level) {
            debug!(
                "Logger: {} dropped a {level} message below the minimum level",
                self.client_name
            );
            return;
        }
        self.queue
            .enqueue(LogMessage::new(self.client_name.clone(), level, text));
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.log(LogLevel::Debug, text);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(LogLevel::Info, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.log(LogLevel::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(LogLevel::Error, text);
    }

    pub fn critical(&self, text: impl Into<String>) {
        self.log(LogLevel::Critical, text);
    }
}

/// Split `host:port`.
pub fn parse_destination(destination: &str) -> Result<(String, u16), LoggerSetupError> {
    let invalid = || LoggerSetupError::InvalidDestination(destination.to_owned());
    let (host, port) = destination.trim().rsplit_once(':').ok_or_else(invalid)?;
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !host_ok {
        return Err(invalid());
    }
    let port = port.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(invalid)?;
    Ok((host.to_owned(), port))
}

fn validate_client_name(client_name: &str) -> Result<(), LoggerSetupError> {
    if client_name.is_empty() {
        return Err(LoggerSetupError::EmptyClientName);
    }
    if client_name
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '\\'))
    {
        return Err(LoggerSetupError::InvalidClientName(client_name.to_owned()));
    }
    Ok(())
}

/// Builds [`Logger`]s backed by a durable cache and a blocking send queue.
#[derive(Clone, Debug)]
pub struct LoggerFactory {
    cache_dir: PathBuf,
    connection: ConnectionConfig,
    reconnect_interval: Duration,
}

impl Default for LoggerFactory {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            connection: ConnectionConfig::default(),
            reconnect_interval: DEFAULT_SEND_QUEUE_INTERVAL,
        }
    }
}

impl LoggerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache file used for `client_name`.
    pub fn cache_path(&self, client_name: &str) -> PathBuf {
        self.cache_dir.join(format!("cache_{client_name}.log"))
    }

    /// Create a logger sending to `destination` (`host:port`).
    ///
    /// The connection is attempted immediately; if the collector is not
    /// reachable messages are cached until it is.
    pub fn get_logger(
        &self,
        destination: &str,
        client_name: &str,
        min_level: Option<LogLevel>,
    ) -> Result<Logger, LoggerSetupError> {
        let (host, port) = parse_destination(destination)?;
        validate_client_name(client_name)?;
        let path = self.cache_path(client_name);
        let cache = FileCache::open(&path).map_err(|source| LoggerSetupError::Cache {
            path: path.clone(),
            source,
        })?;
        let connection =
            ReconnectingConnection::with_config(host, port, self.connection, self.reconnect_interval);
        let queue = BlockingSendQueue::with_connection(cache, connection);
        Ok(Logger::new(Arc::new(queue), client_name, min_level))
    }
}
