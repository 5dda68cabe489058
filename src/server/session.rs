//! Per-connection handler threads and the registry tracking them.

use std::{
    collections::HashMap,
    net::TcpStream,
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::{
    connection::{Connection, ConnectionConfig},
    log_message::now_millis,
    store::LogAdapter,
};

use super::dispatch::ViewerDispatcher;

pub(crate) type SessionId = u64;

struct SessionEntry {
    connection: Connection,
    handle: Option<JoinHandle<()>>,
}

/// Collaborators every session writes to.
#[derive(Clone)]
pub(crate) struct Sinks {
    pub(crate) adapter: Arc<dyn LogAdapter>,
    pub(crate) dispatcher: Arc<ViewerDispatcher>,
}

/// Active sessions, safe to add to and remove from any thread.
#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
}

impl SessionRegistry {
    pub(crate) fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Register `stream` and start its handler thread.
    pub(crate) fn spawn(
        &self,
        id: SessionId,
        stream: TcpStream,
        config: ConnectionConfig,
        sinks: Sinks,
    ) {
        let connection = Connection::from_stream(stream, config);
        let label = connection.label();
        // Registered before the thread starts so its deregistration always
        // finds the entry.
        self.sessions.lock().insert(
            id,
            SessionEntry {
                connection: connection.clone(),
                handle: None,
            },
        );
        let registry = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("logwire-session-{id}"))
            .spawn(move || run_session(id, &connection, &sinks, &registry));
        match spawned {
            Ok(handle) => {
                info!("LoggerServer: session {id} started for {label}");
                let mut sessions = self.sessions.lock();
                match sessions.get_mut(&id) {
                    Some(entry) => entry.handle = Some(handle),
                    // Already finished and deregistered.
                    None => drop(handle),
                }
            }
            Err(err) => {
                warn!("LoggerServer: failed to spawn session for {label}: {err}");
                if let Some(entry) = self.sessions.lock().remove(&id) {
                    entry.connection.close();
                }
            }
        }
    }

    fn deregister(&self, id: SessionId) {
        self.sessions.lock().remove(&id);
    }

    /// Close every session and wait for its handler to exit.
    pub(crate) fn close_all(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock());
        for entry in sessions.values() {
            entry.connection.close();
        }
        for (id, entry) in sessions {
            let Some(handle) = entry.handle else { continue };
            if handle.join().is_err() {
                warn!("LoggerServer: session {id} panicked");
            }
        }
    }
}

/// Persist then publish every message until the channel goes away.
fn run_session(id: SessionId, connection: &Connection, sinks: &Sinks, registry: &SessionRegistry) {
    let mut received = 0u64;
    while let Some(mut message) = connection.receive_next() {
        message.stamp_received(now_millis());
        if !sinks.adapter.save_log_message(&message) {
            debug!("LoggerServer: session {id} could not persist a message");
        }
        sinks.dispatcher.publish(&message);
        received += 1;
    }
    registry.deregister(id);
    connection.close();
    info!(
        "LoggerServer: session {id} for {} ended after {received} messages",
        connection.label()
    );
}
