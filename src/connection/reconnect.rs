//! Self-healing wrapper around [`Connection`].

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use delegate::delegate;
use log::{info, warn};
use parking_lot::Mutex;

use crate::log_message::LogMessage;

use super::{
    Attempt, Connection, ConnectionConfig, ConnectionState, DEFAULT_RECONNECT_INTERVAL, ListenerId,
};

struct ReconnectLoop {
    // Dropping the sender wakes and stops the loop.
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

struct Retry {
    interval: Duration,
    running: Mutex<Option<ReconnectLoop>>,
    closed: AtomicBool,
}

impl Retry {
    fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Start the retry loop unless one is already running.
    fn start(self: &Arc<Self>, connection: Connection) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut running = self.running.lock();
        if running
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
        {
            return;
        }
        let (cancel, cancelled) = bounded(1);
        let retry = Arc::clone(self);
        let label = connection.label();
        let spawned = thread::Builder::new()
            .name("logwire-reconnect".into())
            .spawn(move || retry.run(&connection, &cancelled));
        match spawned {
            Ok(handle) => {
                info!(
                    "ReconnectingConnection: reconnecting to {label} every {:?}",
                    self.interval
                );
                *running = Some(ReconnectLoop { cancel, handle });
            }
            Err(err) => warn!("ReconnectingConnection: failed to spawn retry thread: {err}"),
        }
    }

    fn run(self: &Arc<Self>, connection: &Connection, cancelled: &Receiver<()>) {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            match connection.try_connect() {
                Attempt::Connected => {
                    self.settle(connection);
                    return;
                }
                Attempt::AlreadyConnected => {
                    self.running.lock().take();
                    return;
                }
                Attempt::Failed => {}
            }
            match cancelled.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Retire the loop after a successful tick.
    fn settle(self: &Arc<Self>, connection: &Connection) {
        self.running.lock().take();
        // A disconnect between the connect and the take above found this
        // loop still running and did not start another.
        if !connection.is_connected() {
            self.start(connection.clone());
            return;
        }
        connection.notify_connected();
    }

    fn cancel(&self) {
        let Some(active) = self.running.lock().take() else {
            return;
        };
        drop(active.cancel);
        // A listener running on the retry thread may close the connection.
        if active.handle.thread().id() != thread::current().id() {
            let _ = active.handle.join();
        }
    }
}

/// [`Connection`] that keeps retrying after every disconnect until closed.
///
/// Any disconnect notification, including a failed
/// [`connect`](Self::connect), starts one retry loop that calls connect
/// every `interval` with no backoff and no give-up. The first successful
/// tick stops the loop and notifies connect listeners from the retry
/// thread. Further disconnects while a loop runs are ignored.
pub struct ReconnectingConnection {
    inner: Connection,
    retry: Arc<Retry>,
}

impl ReconnectingConnection {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(host, port, ConnectionConfig::default(), DEFAULT_RECONNECT_INTERVAL)
    }

    pub fn with_interval(host: impl Into<String>, port: u16, interval: Duration) -> Self {
        Self::with_config(host, port, ConnectionConfig::default(), interval)
    }

    pub fn with_config(
        host: impl Into<String>,
        port: u16,
        config: ConnectionConfig,
        interval: Duration,
    ) -> Self {
        let inner = Connection::with_config(host, port, config);
        let retry = Arc::new(Retry {
            interval,
            running: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        let weak_retry = Arc::downgrade(&retry);
        let weak_inner = inner.downgrade();
        inner.add_disconnect_listener(move || {
            if let (Some(retry), Some(connection)) = (weak_retry.upgrade(), weak_inner.upgrade()) {
                retry.start(connection);
            }
        });
        Self { inner, retry }
    }

    pub fn interval(&self) -> Duration {
        self.retry.interval
    }

    /// Whether a retry loop is currently active.
    pub fn is_reconnecting(&self) -> bool {
        self.retry.is_running()
    }

    pub fn state(&self) -> ConnectionState {
        if self.inner.is_connected() {
            ConnectionState::Connected
        } else if self.is_reconnecting() {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Connection {
        &self.inner
    }

    /// Run the end-of-loop step as the retry thread would after a
    /// successful tick.
    #[cfg(test)]
    pub(crate) fn settle_retry(&self) {
        self.retry.settle(&self.inner);
    }

    /// Stop retrying and release the channel. Idempotent.
    pub fn close(&self) {
        self.retry.closed.store(true, Ordering::Release);
        self.retry.cancel();
        self.inner.close();
    }

    delegate! {
        to self.inner {
            pub fn host(&self) -> String;
            pub fn set_host(&self, host: impl Into<String>);
            pub fn port(&self) -> u16;
            pub fn set_port(&self, port: u16);
            pub fn label(&self) -> String;
            pub fn config(&self) -> ConnectionConfig;
            pub fn is_connected(&self) -> bool;
            pub fn is_closed(&self) -> bool;
            pub fn peer_addr(&self) -> Option<SocketAddr>;
            /// Connect now; a failure starts the retry loop.
            pub fn connect(&self) -> bool;
            pub fn send(&self, message: &LogMessage) -> bool;
            pub fn receive_next(&self) -> Option<LogMessage>;
            pub fn add_connect_listener(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId;
            pub fn remove_connect_listener(&self, id: ListenerId) -> bool;
            pub fn add_disconnect_listener(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId;
            pub fn remove_disconnect_listener(&self, id: ListenerId) -> bool;
        }
    }
}

impl Drop for ReconnectingConnection {
    fn drop(&mut self) {
        self.close();
    }
}
