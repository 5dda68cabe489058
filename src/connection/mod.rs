//! A single framed TCP channel with connect/disconnect notification.
//!
//! [`Connection`] owns at most one socket at a time. Expected network
//! conditions (refused connects, failed writes, a peer hanging up) never
//! surface as errors: operations report `bool`/`Option` and the registered
//! listeners hear about state changes. [`ReconnectingConnection`] layers a
//! retry loop on top by listening for disconnects.
//!
//! Handles are cheap to clone and all clones drive the same channel.

mod config;
mod listeners;
mod reconnect;
mod transport;

#[cfg(test)]
mod tests;

use std::{
    fmt,
    io::{BufReader, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{Arc, Weak},
};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::{
    codec::{self, CodecError},
    log_message::LogMessage,
};

pub use config::{
    ConnectionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_INTERVAL, DEFAULT_WRITE_TIMEOUT,
};
pub use listeners::ListenerId;
pub use reconnect::ReconnectingConnection;

use listeners::ListenerSet;
use transport::{SharedStream, connect_tcp, endpoint_label};

/// Observable state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Disconnected with a retry loop running.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        })
    }
}

/// Result of one connection attempt that does not notify listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Attempt {
    Connected,
    AlreadyConnected,
    Failed,
}

#[derive(Clone, Debug)]
struct Endpoint {
    host: String,
    port: u16,
}

struct Channel {
    id: u64,
    stream: Arc<TcpStream>,
}

struct ChannelReader {
    id: u64,
    reader: BufReader<SharedStream>,
}

#[derive(Default)]
struct State {
    channel: Option<Channel>,
    next_id: u64,
    closed: bool,
}

impl State {
    fn install(&mut self, stream: TcpStream) {
        self.next_id += 1;
        self.channel = Some(Channel {
            id: self.next_id,
            stream: Arc::new(stream),
        });
    }

    /// Remove the current channel if it is `expected` (or any when `None`).
    fn take_channel(&mut self, expected: Option<u64>) -> Option<Channel> {
        let matches = self
            .channel
            .as_ref()
            .is_some_and(|channel| expected.is_none_or(|id| channel.id == id));
        if matches { self.channel.take() } else { None }
    }
}

struct Shared {
    endpoint: Mutex<Endpoint>,
    config: ConnectionConfig,
    // Writers serialise on `state`; the blocking reader only holds `reader`.
    state: Mutex<State>,
    reader: Mutex<Option<ChannelReader>>,
    connect_listeners: ListenerSet,
    disconnect_listeners: ListenerSet,
}

/// Client or server end of a framed TCP channel.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

/// Non-owning handle used by listeners that must not keep a connection alive.
#[derive(Clone)]
pub(crate) struct WeakConnection(Weak<Shared>);

impl WeakConnection {
    pub(crate) fn upgrade(&self) -> Option<Connection> {
        self.0.upgrade().map(|shared| Connection { shared })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.label())
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    /// Create a disconnected connection targeting `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(host, port, ConnectionConfig::default())
    }

    pub fn with_config(host: impl Into<String>, port: u16, config: ConnectionConfig) -> Self {
        Self::from_parts(
            Endpoint {
                host: host.into(),
                port,
            },
            config,
            State::default(),
        )
    }

    /// Wrap an already established socket, e.g. one accepted by a server.
    pub fn from_stream(stream: TcpStream, config: ConnectionConfig) -> Self {
        let endpoint = match stream.peer_addr() {
            Ok(addr) => Endpoint {
                host: addr.ip().to_string(),
                port: addr.port(),
            },
            Err(_) => Endpoint {
                host: "unknown".into(),
                port: 0,
            },
        };
        if let Err(err) = stream.set_write_timeout(config.write_timeout) {
            debug!("Connection: failed to set write timeout: {err}");
        }
        let mut state = State::default();
        state.install(stream);
        Self::from_parts(endpoint, config, state)
    }

    fn from_parts(endpoint: Endpoint, config: ConnectionConfig, state: State) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoint: Mutex::new(endpoint),
                config,
                state: Mutex::new(state),
                reader: Mutex::new(None),
                connect_listeners: ListenerSet::default(),
                disconnect_listeners: ListenerSet::default(),
            }),
        }
    }

    pub fn host(&self) -> String {
        self.shared.endpoint.lock().host.clone()
    }

    /// Change the target host; takes effect on the next connect.
    pub fn set_host(&self, host: impl Into<String>) {
        self.shared.endpoint.lock().host = host.into();
    }

    pub fn port(&self) -> u16 {
        self.shared.endpoint.lock().port
    }

    /// Change the target port; takes effect on the next connect.
    pub fn set_port(&self, port: u16) {
        self.shared.endpoint.lock().port = port;
    }

    pub fn config(&self) -> ConnectionConfig {
        self.shared.config
    }

    /// `tcp://host:port` of the configured endpoint.
    pub fn label(&self) -> String {
        let endpoint = self.shared.endpoint.lock();
        endpoint_label(&endpoint.host, endpoint.port)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().channel.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Address of the peer on the current channel.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        let state = self.shared.state.lock();
        state
            .channel
            .as_ref()
            .and_then(|channel| channel.stream.peer_addr().ok())
    }

    pub fn add_connect_listener(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.shared.connect_listeners.add(listener)
    }

    pub fn remove_connect_listener(&self, id: ListenerId) -> bool {
        self.shared.connect_listeners.remove(id)
    }

    pub fn add_disconnect_listener(
        &self,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> ListenerId {
        self.shared.disconnect_listeners.add(listener)
    }

    pub fn remove_disconnect_listener(&self, id: ListenerId) -> bool {
        self.shared.disconnect_listeners.remove(id)
    }

    /// Open the channel and notify listeners of the outcome.
    ///
    /// Connect listeners run on success, disconnect listeners on failure.
    /// Calling this while already connected is a no-op returning `true`.
    pub fn connect(&self) -> bool {
        match self.try_connect() {
            Attempt::Connected => {
                self.shared.connect_listeners.notify();
                true
            }
            Attempt::AlreadyConnected => true,
            Attempt::Failed => {
                if !self.is_closed() {
                    self.shared.disconnect_listeners.notify();
                }
                false
            }
        }
    }

    pub(crate) fn downgrade(&self) -> WeakConnection {
        WeakConnection(Arc::downgrade(&self.shared))
    }

    pub(crate) fn notify_connected(&self) {
        self.shared.connect_listeners.notify();
    }

    /// Open the channel without notifying anyone.
    pub(crate) fn try_connect(&self) -> Attempt {
        {
            let state = self.shared.state.lock();
            if state.closed {
                debug!("Connection: connect requested after close");
                return Attempt::Failed;
            }
            if state.channel.is_some() {
                return Attempt::AlreadyConnected;
            }
        }
        let Endpoint { host, port } = self.shared.endpoint.lock().clone();
        let label = endpoint_label(&host, port);
        let stream = match connect_tcp(&host, port, self.shared.config.connect_timeout) {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Connection: failed to connect to {label}: {err}");
                return Attempt::Failed;
            }
        };
        if let Err(err) = stream.set_write_timeout(self.shared.config.write_timeout) {
            debug!("Connection: failed to set write timeout on {label}: {err}");
        }

        let mut state = self.shared.state.lock();
        if state.closed {
            let _ = stream.shutdown(Shutdown::Both);
            return Attempt::Failed;
        }
        if state.channel.is_some() {
            let _ = stream.shutdown(Shutdown::Both);
            return Attempt::AlreadyConnected;
        }
        state.install(stream);
        drop(state);
        info!("Connection: connected to {label}");
        Attempt::Connected
    }

    /// Encode and write `message`.
    ///
    /// Returns `false` when not connected, when the message cannot be
    /// framed, or when the write fails. A failed write tears the channel
    /// down and notifies disconnect listeners before returning.
    pub fn send(&self, message: &LogMessage) -> bool {
        let frame = match codec::encode(message) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Connection: refusing to send unframeable message: {err}");
                return false;
            }
        };
        let mut state = self.shared.state.lock();
        let Some(channel) = state.channel.as_ref() else {
            debug!("Connection: send attempted while not connected");
            return false;
        };
        let written = (&*channel.stream)
            .write_all(&frame)
            .and_then(|()| (&*channel.stream).flush());
        let Err(err) = written else {
            return true;
        };
        let torn_down = state.take_channel(None);
        drop(state);
        debug!("Connection: write to {} failed: {err}", self.label());
        if let Some(channel) = torn_down {
            self.release(channel);
            self.shared.disconnect_listeners.notify();
        }
        false
    }

    /// Block until the next message arrives.
    ///
    /// Returns `None` once the channel is gone: after the peer hangs up,
    /// after a read failure or an unrecoverable framing error (both of
    /// which also notify disconnect listeners), or when not connected at
    /// all. Frames that decode to an invalid message but leave the stream
    /// aligned are skipped with a warning.
    pub fn receive_next(&self) -> Option<LogMessage> {
        let mut slot = self.shared.reader.lock();
        loop {
            let (id, stream) = {
                let state = self.shared.state.lock();
                let channel = state.channel.as_ref()?;
                (channel.id, Arc::clone(&channel.stream))
            };
            if slot.as_ref().is_none_or(|current| current.id != id) {
                *slot = Some(ChannelReader {
                    id,
                    reader: BufReader::new(SharedStream(stream)),
                });
            }
            let reader = slot.as_mut()?;
            match codec::decode_with_limits(&mut reader.reader, self.shared.config.limits) {
                Ok(message) => return Some(message),
                Err(CodecError::Malformed(err)) if err.is_recoverable() => {
                    warn!("Connection: skipping malformed frame from {}: {err}", self.label());
                }
                Err(err) => {
                    *slot = None;
                    drop(slot);
                    match err {
                        CodecError::Closed => {
                            debug!("Connection: peer {} closed the channel", self.label())
                        }
                        other => warn!("Connection: read from {} failed: {other}", self.label()),
                    }
                    self.disconnect_channel(id);
                    return None;
                }
            }
        }
    }

    /// Tear down channel `id` and notify, unless it was already replaced
    /// or closed.
    fn disconnect_channel(&self, id: u64) {
        let torn_down = self.shared.state.lock().take_channel(Some(id));
        if let Some(channel) = torn_down {
            self.release(channel);
            self.shared.disconnect_listeners.notify();
        }
    }

    fn release(&self, channel: Channel) {
        let _ = channel.stream.shutdown(Shutdown::Both);
        info!("Connection: disconnected from {}", self.label());
    }

    /// Shut the socket down underneath the connection, as a network failure
    /// would, without updating any state.
    #[cfg(test)]
    pub(crate) fn sever(&self) {
        if let Some(channel) = self.shared.state.lock().channel.as_ref() {
            let _ = channel.stream.shutdown(Shutdown::Both);
        }
    }

    /// Release the channel permanently.
    ///
    /// Idempotent. Listeners are not notified, a blocked
    /// [`receive_next`](Self::receive_next) returns `None`, and later
    /// connects fail.
    pub fn close(&self) {
        let channel = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.take_channel(None)
        };
        if let Some(channel) = channel {
            let _ = channel.stream.shutdown(Shutdown::Both);
        }
        info!("Connection: closed {}", self.label());
    }
}
