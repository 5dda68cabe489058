//! Persistence of formatted log messages.
//!
//! [`FormattedLogAdapter`] combines a [`TextStore`] with a
//! [`LogMessageFormatter`]. It is what the collector writes received
//! messages into and what the durable client cache is built on.

mod text_store;


use std::{io, path::Path, sync::Arc};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    format::{LogFormat, LogMessageFormatter},
    log_message::{LogMessage, now_millis},
    rate_limited_warner::RateLimitedWarner,
};

pub use text_store::{PersistedLine, TextStore};

/// Storage for log messages.
///
/// Implementations are shared between server sessions, so every method
/// takes `&self` and must be safe to call concurrently.
pub trait LogAdapter: Send + Sync {
    /// Persist `message`, returning `false` when it is not guaranteed stored.
    fn save_log_message(&self, message: &LogMessage) -> bool;

    /// Load up to `count` messages in the order they were saved.
    fn load_log_messages(&self, count: usize) -> Vec<LogMessage>;
}

impl<T: LogAdapter + ?Sized> LogAdapter for Arc<T> {
    fn save_log_message(&self, message: &LogMessage) -> bool {
        (**self).save_log_message(message)
    }

    fn load_log_messages(&self, count: usize) -> Vec<LogMessage> {
        (**self).load_log_messages(count)
    }
}

/// [`LogAdapter`] writing one formatted record per line of a [`TextStore`].
pub struct FormattedLogAdapter<F = Box<dyn LogMessageFormatter>> {
    store: Mutex<TextStore>,
    formatter: F,
    warner: RateLimitedWarner,
}

impl FormattedLogAdapter {
    /// Open `path` using one of the built-in formats.
    pub fn open_with_format(path: impl AsRef<Path>, format: LogFormat) -> io::Result<Self> {
        Self::open(path, format.formatter())
    }
}

impl<F: LogMessageFormatter> FormattedLogAdapter<F> {
    pub fn open(path: impl AsRef<Path>, formatter: F) -> io::Result<Self> {
        Ok(Self {
            store: Mutex::new(TextStore::open(path)?),
            formatter,
            warner: RateLimitedWarner::default(),
        })
    }

    /// Remove every stored message.
    pub fn clear(&self) -> bool {
        let mut store = self.store.lock();
        match store.truncate() {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "FormattedLogAdapter: failed to truncate {}: {err}",
                    store.path().display()
                );
                false
            }
        }
    }
}

impl<F: LogMessageFormatter> LogAdapter for FormattedLogAdapter<F> {
    fn save_log_message(&self, message: &LogMessage) -> bool {
        let record = self.formatter.serialize(message);
        let mut store = self.store.lock();
        match store.append(now_millis(), &record) {
            Ok(()) => true,
            Err(err) => {
                self.warner.record_drop();
                self.warner.warn_if_due(|count| {
                    warn!(
                        "FormattedLogAdapter: failed to write {}: {err}; {count} messages not persisted",
                        store.path().display()
                    );
                });
                false
            }
        }
    }

    fn load_log_messages(&self, count: usize) -> Vec<LogMessage> {
        if count == 0 {
            return Vec::new();
        }
        let store = self.store.lock();
        let lines = match store.read(count) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(
                    "FormattedLogAdapter: failed to read {}: {err}",
                    store.path().display()
                );
                return Vec::new();
            }
        };
        lines
            .into_iter()
            .filter_map(|line| match self.formatter.parse(&line.payload) {
                Ok(message) => Some(message),
                Err(err) => {
                    debug!("FormattedLogAdapter: skipping unparsable record: {err}");
                    None
                }
            })
            .collect()
    }
}
