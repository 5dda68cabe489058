//! Best-effort fan-out of received messages to live viewers.
//!
//! [`ViewerDispatcher`] owns a bounded queue and one worker thread. Server
//! sessions call [`publish`](ViewerDispatcher::publish) after a message has
//! been persisted; publishing never blocks and never fails, so a slow or
//! absent viewer cannot affect the read loop or durability.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use log::{debug, warn};
use parking_lot::Mutex;

use crate::{log_message::LogMessage, rate_limited_warner::RateLimitedWarner};

/// Default capacity of the dispatch queue.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 1024;

/// Receiver of published messages, e.g. one live-viewer session.
pub trait ViewerSink: Send + Sync {
    /// Deliver one message. Returning `false` marks the sink closed and it
    /// is removed.
    fn deliver(&self, message: &LogMessage) -> bool;
}

/// Forwards to a channel, dropping messages while the receiver lags.
impl ViewerSink for Sender<LogMessage> {
    fn deliver(&self, message: &LogMessage) -> bool {
        match self.try_send(message.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Handle identifying a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscribers = Arc<Mutex<Vec<(SubscriberId, Arc<dyn ViewerSink>)>>>;

struct Worker {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Explicitly constructed fan-out hub with its own subscriber set.
pub struct ViewerDispatcher {
    tx: Sender<LogMessage>,
    subscribers: Subscribers,
    next_id: AtomicU64,
    warner: RateLimitedWarner,
    worker: Mutex<Option<Worker>>,
}

impl Default for ViewerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewerDispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DISPATCH_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded::<LogMessage>(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let subscribers: Subscribers = Arc::default();
        let worker_subscribers = Arc::clone(&subscribers);
        let handle = thread::Builder::new()
            .name("logwire-dispatch".into())
            .spawn(move || dispatch_loop(rx, shutdown_rx, worker_subscribers));
        let worker = match handle {
            Ok(handle) => Some(Worker {
                shutdown_tx,
                handle,
            }),
            Err(err) => {
                warn!("ViewerDispatcher: failed to spawn worker; viewers will receive nothing: {err}");
                None
            }
        };
        Self {
            tx,
            subscribers,
            next_id: AtomicU64::new(0),
            warner: RateLimitedWarner::default(),
            worker: Mutex::new(worker),
        }
    }

    pub fn subscribe(&self, sink: impl ViewerSink + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(sink)));
        debug!("ViewerDispatcher: subscriber {id:?} added");
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        let removed = subscribers.len() != before;
        if removed {
            debug!("ViewerDispatcher: subscriber {id:?} removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Queue `message` for every current subscriber.
    ///
    /// Discarded immediately when nobody is subscribed; dropped with a
    /// rate-limited warning when the queue is full or shut down.
    pub fn publish(&self, message: &LogMessage) {
        if self.subscribers.lock().is_empty() {
            return;
        }
        match self.tx.try_send(message.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.warner.record_drop();
                self.warner.warn_if_due(|count| {
                    warn!("ViewerDispatcher: queue full; dropped {count} messages");
                });
            }
            Err(TrySendError::Disconnected(_)) => {
                self.warner.record_drop();
                self.warner.warn_if_due(|count| {
                    warn!("ViewerDispatcher: shut down; dropped {count} messages");
                });
            }
        }
    }

    /// Stop the worker after it has delivered what is already queued.
    /// Idempotent.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.shutdown_tx.send(());
        if worker.handle.join().is_err() {
            warn!("ViewerDispatcher: worker thread panicked");
        }
        self.warner.flush(|count| {
            warn!("ViewerDispatcher: dropped {count} messages");
        });
    }
}

impl Drop for ViewerDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(rx: Receiver<LogMessage>, shutdown_rx: Receiver<()>, subscribers: Subscribers) {
    loop {
        select! {
            recv(rx) -> message => match message {
                Ok(message) => fan_out(&message, &subscribers),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => {
                while let Ok(message) = rx.try_recv() {
                    fan_out(&message, &subscribers);
                }
                break;
            }
        }
    }
}

fn fan_out(message: &LogMessage, subscribers: &Subscribers) {
    let snapshot: Vec<(SubscriberId, Arc<dyn ViewerSink>)> = subscribers.lock().clone();
    let closed: Vec<SubscriberId> = snapshot
        .iter()
        .filter(|(_, sink)| !sink.deliver(message))
        .map(|(id, _)| *id)
        .collect();
    if !closed.is_empty() {
        subscribers
            .lock()
            .retain(|(id, _)| !closed.contains(id));
        debug!("ViewerDispatcher: pruned {} closed subscribers", closed.len());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::unbounded;
    use rstest::rstest;

    use super::*;
    use crate::level::LogLevel;

    const WAIT: Duration = Duration::from_secs(2);

    fn message(text: &str) -> LogMessage {
        LogMessage::new("viewer-test", LogLevel::Info, text)
    }

    #[rstest]
    fn fans_out_to_every_subscriber() {
        let dispatcher = ViewerDispatcher::new();
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded();
        dispatcher.subscribe(a_tx);
        dispatcher.subscribe(b_tx);
        dispatcher.publish(&message("hello"));
        assert_eq!(a_rx.recv_timeout(WAIT).expect("a").text(), "hello");
        assert_eq!(b_rx.recv_timeout(WAIT).expect("b").text(), "hello");
    }

    #[rstest]
    fn unsubscribed_sink_receives_nothing() {
        let dispatcher = ViewerDispatcher::new();
        let (tx, rx) = unbounded();
        let id = dispatcher.subscribe(tx);
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.publish(&message("ignored"));
        dispatcher.shutdown();
        assert!(rx.try_recv().is_err());
    }

    #[rstest]
    fn closed_sinks_are_pruned() {
        let dispatcher = ViewerDispatcher::new();
        let (gone_tx, gone_rx) = unbounded();
        let (live_tx, live_rx) = unbounded();
        dispatcher.subscribe(gone_tx);
        dispatcher.subscribe(live_tx);
        drop(gone_rx);
        dispatcher.publish(&message("one"));
        live_rx.recv_timeout(WAIT).expect("live");
        dispatcher.shutdown();
        assert_eq!(dispatcher.subscriber_count(), 1);
    }

    #[rstest]
    fn shutdown_is_idempotent_and_publish_after_is_harmless() {
        let dispatcher = ViewerDispatcher::new();
        let (tx, _rx) = unbounded();
        dispatcher.subscribe(tx);
        dispatcher.shutdown();
        dispatcher.shutdown();
        dispatcher.publish(&message("late"));
    }

    #[rstest]
    fn shutdown_delivers_already_queued_messages() {
        let dispatcher = ViewerDispatcher::new();
        let (tx, rx) = unbounded();
        dispatcher.subscribe(tx);
        for n in 0..10 {
            dispatcher.publish(&message(&format!("m{n}")));
        }
        dispatcher.shutdown();
        assert_eq!(rx.try_iter().count(), 10);
    }
}
