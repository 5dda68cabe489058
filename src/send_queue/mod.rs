//! Ordered, cache-backed delivery of log messages to the collector.
//!
//! [`BlockingSendQueue`] sends directly while the connection is healthy and
//! falls back to its [`CacheStrategy`] otherwise. Whenever the underlying
//! [`ReconnectingConnection`] comes back, the backlog is drained before any
//! new message is allowed through, so the collector sees messages in
//! enqueue order.


use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::{
    cache::CacheStrategy,
    codec,
    connection::{ConnectionConfig, ConnectionState, ReconnectingConnection},
    log_message::LogMessage,
};

/// Reconnect interval used by send queues.
pub const DEFAULT_SEND_QUEUE_INTERVAL: Duration = Duration::from_millis(50);

/// Accepts messages for asynchronous, best-effort-durable delivery.
///
/// `enqueue` never reports transport failures to the caller.
pub trait SendQueue: Send + Sync {
    fn enqueue(&self, message: LogMessage);
}

impl<F> SendQueue for F
where
    F: Fn(LogMessage) + Send + Sync,
{
    fn enqueue(&self, message: LogMessage) {
        self(message)
    }
}

struct QueueState<C> {
    ready: bool,
    cache: C,
}

struct Inner<C> {
    state: Mutex<QueueState<C>>,
    connection: ReconnectingConnection,
}

impl<C: CacheStrategy> Inner<C> {
    /// Resend the backlog in order, then decide whether new traffic may
    /// bypass the cache.
    fn drain(&self) {
        let mut state = self.state.lock();
        let backlog = state.cache.retrieve_all();
        let mut sent = 0usize;
        let mut failed_at = None;
        for (idx, message) in backlog.iter().enumerate() {
            if let Err(err) = codec::validate(message) {
                warn!("BlockingSendQueue: discarding cached message that cannot be framed: {err}");
                continue;
            }
            if !self.connection.send(message) {
                failed_at = Some(idx);
                break;
            }
            sent += 1;
        }
        if !backlog.is_empty() && !state.cache.clear() {
            error!(
                "BlockingSendQueue: failed to clear backlog; {sent} delivered messages may be resent"
            );
        }
        let Some(idx) = failed_at else {
            if sent > 0 {
                debug!("BlockingSendQueue: drained {sent} cached messages");
            }
            state.ready = self.connection.is_connected();
            return;
        };
        // Keep the failed message and everything after it, in order.
        let unsent = backlog[idx..]
            .iter()
            .filter(|message| codec::validate(message).is_ok());
        let mut kept = 0usize;
        for message in unsent {
            if state.cache.save(message) {
                kept += 1;
            } else {
                error!("BlockingSendQueue: lost a backlog message while re-caching it");
            }
        }
        debug!(
            "BlockingSendQueue: drain interrupted after {sent} of {} messages; {kept} kept",
            backlog.len()
        );
        state.ready = false;
    }

    fn enqueue(&self, message: LogMessage) {
        if let Err(err) = codec::validate(&message) {
            warn!("BlockingSendQueue: dropping message that cannot be framed: {err}");
            return;
        }
        let mut state = self.state.lock();
        if state.ready && self.connection.send(&message) {
            return;
        }
        state.ready = false;
        if !state.cache.save(&message) {
            error!("BlockingSendQueue: message could neither be sent nor cached");
        }
    }
}

/// [`SendQueue`] that sends on the caller's thread and caches on failure.
///
/// One lock guards the cache and the readiness flag, so `enqueue` waits
/// while a backlog drain is in progress.
pub struct BlockingSendQueue<C: CacheStrategy> {
    inner: Arc<Inner<C>>,
}

impl<C: CacheStrategy + 'static> BlockingSendQueue<C> {
    /// Queue delivering to `host:port` with the default send-queue interval.
    pub fn new(cache: C, host: impl Into<String>, port: u16) -> Self {
        Self::with_connection(
            cache,
            ReconnectingConnection::with_config(
                host,
                port,
                ConnectionConfig::default(),
                DEFAULT_SEND_QUEUE_INTERVAL,
            ),
        )
    }

    /// Queue over an existing, not yet connected connection.
    ///
    /// Connects immediately. Anything already in `cache` is delivered
    /// first once the connection is up.
    pub fn with_connection(cache: C, connection: ReconnectingConnection) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState { ready: false, cache }),
            connection,
        });
        let weak: Weak<Inner<C>> = Arc::downgrade(&inner);
        inner.connection.add_connect_listener(move || {
            if let Some(inner) = weak.upgrade() {
                inner.drain();
            }
        });
        inner.connection.connect();
        Self { inner }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Whether new messages currently go straight to the wire.
    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    /// Messages waiting in the cache, oldest first.
    pub fn backlog(&self) -> Vec<LogMessage> {
        self.inner.state.lock().cache.retrieve_all()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog().len()
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &ReconnectingConnection {
        &self.inner.connection
    }

    /// Stop reconnecting and release the connection. The backlog stays in
    /// the cache.
    pub fn close(&self) {
        // Never under the queue lock: closing joins the retry thread,
        // which may be waiting for that lock to drain.
        self.inner.connection.close();
        self.inner.state.lock().ready = false;
    }
}

impl<C: CacheStrategy + 'static> SendQueue for BlockingSendQueue<C> {
    fn enqueue(&self, message: LogMessage) {
        self.inner.enqueue(message);
    }
}

impl<C: CacheStrategy> Drop for BlockingSendQueue<C> {
    fn drop(&mut self) {
        self.inner.connection.close();
    }
}
