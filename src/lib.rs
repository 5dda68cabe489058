//! Reliable transport of log messages from producing applications to a
//! central collector.
//!
//! Producers obtain a [`Logger`] from a [`LoggerFactory`]. Messages travel
//! through a [`BlockingSendQueue`] that caches them while the collector is
//! unreachable and replays the backlog, in order, once a
//! [`ReconnectingConnection`] is back. The collector side is
//! [`LoggerServer`], which persists every message through a [`LogAdapter`]
//! and fans it out to live viewers via a [`ViewerDispatcher`].

pub mod cache;
pub mod client;
pub mod codec;
pub mod connection;
pub mod format;
pub mod level;
pub mod log_message;
mod rate_limited_warner;
pub mod send_queue;
pub mod server;
pub mod store;

pub use cache::{CacheStrategy, FileCache, MemoryCache};
pub use client::{LogBridge, Logger, LoggerFactory, LoggerSetupError};
pub use codec::{CodecError, MalformedMessage};
pub use connection::{Connection, ConnectionConfig, ConnectionState, ReconnectingConnection};
pub use format::{LogFormat, LogMessageFormatter};
pub use level::LogLevel;
pub use log_message::LogMessage;
pub use send_queue::{BlockingSendQueue, SendQueue};
pub use server::{LoggerServer, RunningServer, ServerConfig, ViewerDispatcher};
pub use store::{FormattedLogAdapter, LogAdapter};
