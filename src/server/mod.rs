//! The collector: accepts client connections, persists every received
//! message and forwards it to live viewers.
//!
//! [`LoggerServer::start`] binds the listener and runs the accept loop on
//! its own thread. Each accepted connection gets an independent session
//! thread, so a slow client never holds up another. The returned
//! [`RunningServer`] stops everything.

mod config;
mod dispatch;
mod session;


use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::{connection::ConnectionConfig, store::LogAdapter};

pub use config::{
    ArgsConfigSource, CONFIG_FILE_KEY, CONFIG_KEYS, ConfigError, ConfigSource, DEFAULT_LISTEN_PORT,
    DEFAULT_LOG_FILE, DEFAULT_MAX_CONNECTIONS, EnvConfigSource, IniConfigSource, ServerConfig,
};
pub use dispatch::{DEFAULT_DISPATCH_CAPACITY, SubscriberId, ViewerDispatcher, ViewerSink};

use session::{SessionId, SessionRegistry, Sinks};

/// How often the accept loop checks for a stop request while idle.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to start accept loop: {0}")]
    Spawn(#[source] io::Error),
}

/// Entry point for starting a collector.
pub struct LoggerServer;

impl LoggerServer {
    /// Bind according to `config` and start accepting connections.
    pub fn start(
        config: &ServerConfig,
        adapter: Arc<dyn LogAdapter>,
        dispatcher: Arc<ViewerDispatcher>,
    ) -> Result<RunningServer, ServerError> {
        let ip = config
            .interface
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let addr = SocketAddr::new(ip, config.listen_port);
        let bind_err = |source| ServerError::Bind { addr, source };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let accept = AcceptLoop {
            listener,
            max_connections: config.max_connections,
            connection: ConnectionConfig::default(),
            sinks: Sinks {
                adapter,
                dispatcher,
            },
            sessions: SessionRegistry::default(),
        };
        let sessions = accept.sessions.clone();
        let handle = thread::Builder::new()
            .name("logwire-accept".into())
            .spawn(move || accept.run(&stop_rx))
            .map_err(ServerError::Spawn)?;
        info!("LoggerServer: listening on tcp://{local_addr}");
        Ok(RunningServer {
            local_addr,
            sessions,
            control: Mutex::new(Some(Control {
                stop: stop_tx,
                handle,
            })),
        })
    }
}

struct AcceptLoop {
    listener: TcpListener,
    max_connections: usize,
    connection: ConnectionConfig,
    sinks: Sinks,
    sessions: SessionRegistry,
}

impl AcceptLoop {
    fn run(self, stop: &Receiver<()>) {
        let mut next_id: SessionId = 0;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.admit(next_id, stream, peer);
                    next_id += 1;
                    continue;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => warn!("LoggerServer: accept failed: {err}"),
            }
            match stop.recv_timeout(ACCEPT_POLL_INTERVAL) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("LoggerServer: accept loop finished");
    }

    fn admit(&self, id: SessionId, stream: TcpStream, peer: SocketAddr) {
        if self.sessions.len() >= self.max_connections {
            warn!(
                "LoggerServer: rejecting tcp://{peer}; {} sessions already active",
                self.max_connections
            );
            return;
        }
        // Accepted sockets may inherit the listener's non-blocking mode.
        if let Err(err) = stream.set_nonblocking(false) {
            warn!("LoggerServer: dropping tcp://{peer}: {err}");
            return;
        }
        self.sessions
            .spawn(id, stream, self.connection, self.sinks.clone());
    }
}

struct Control {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Handle to a started collector.
pub struct RunningServer {
    local_addr: SocketAddr,
    sessions: SessionRegistry,
    control: Mutex<Option<Control>>,
}

impl RunningServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Stop accepting, close the listener and end every session.
    /// Idempotent.
    pub fn stop(&self) {
        let Some(control) = self.control.lock().take() else {
            return;
        };
        let _ = control.stop.send(());
        if control.handle.join().is_err() {
            warn!("LoggerServer: accept loop panicked");
        }
        self.sessions.close_all();
        info!("LoggerServer: stopped tcp://{}", self.local_addr);
    }

    /// Block until the accept loop exits, then end every session.
    pub fn wait(&self) {
        // Polled rather than joined so a concurrent stop() can take the
        // handle.
        loop {
            let finished = self
                .control
                .lock()
                .as_ref()
                .is_none_or(|control| control.handle.is_finished());
            if finished {
                break;
            }
            thread::sleep(ACCEPT_POLL_INTERVAL);
        }
        self.stop();
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.stop();
    }
}
