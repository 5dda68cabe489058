//! Tests for plain and reconnecting connections over loopback sockets.

use std::{
    io::Write,
    net::{TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, unbounded};
use rstest::{fixture, rstest};

use super::*;
use crate::level::LogLevel;

const WAIT: Duration = Duration::from_secs(5);

#[fixture]
fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

/// A loopback port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    listener.local_addr().expect("addr").port()
}

fn message(text: &str) -> LogMessage {
    LogMessage::new("conn-test", LogLevel::Info, text)
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    (count, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

fn signal() -> (Receiver<()>, impl Fn() + Send + Sync + 'static) {
    let (tx, rx) = unbounded();
    (rx, move || {
        let _ = tx.send(());
    })
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Accept one connection and forward every decoded frame.
fn spawn_collector(listener: TcpListener) -> Receiver<LogMessage> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let server_side = Connection::from_stream(stream, ConnectionConfig::default());
        while let Some(message) = server_side.receive_next() {
            if tx.send(message).is_err() {
                break;
            }
        }
    });
    rx
}

#[rstest]
fn connect_notifies_listeners_in_order(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let connection = Connection::new("127.0.0.1", port);
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for n in 0..3 {
        let order = Arc::clone(&order);
        connection.add_connect_listener(move || order.lock().push(n));
    }
    assert!(connection.connect());
    assert_eq!(*order.lock(), vec![0, 1, 2]);
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(connection.peer_addr().is_some());
}

#[rstest]
fn failed_connect_notifies_disconnect_listeners() {
    let connection = Connection::new("127.0.0.1", closed_port());
    let (connects, on_connect) = counter();
    let (disconnects, on_disconnect) = counter();
    connection.add_connect_listener(on_connect);
    connection.add_disconnect_listener(on_disconnect);
    assert!(!connection.connect());
    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[rstest]
fn send_without_channel_returns_false_quietly() {
    let connection = Connection::new("127.0.0.1", closed_port());
    let (disconnects, on_disconnect) = counter();
    connection.add_disconnect_listener(on_disconnect);
    assert!(!connection.send(&message("nobody home")));
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    assert!(connection.receive_next().is_none());
}

#[rstest]
fn send_delivers_frames_in_order(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let received = spawn_collector(tcp_listener);
    let connection = Connection::new("127.0.0.1", port);
    assert!(connection.connect());
    let sent: Vec<_> = (0..5).map(|n| message(&format!("m{n}"))).collect();
    for m in &sent {
        assert!(connection.send(m));
    }
    let got: Vec<_> = (0..5)
        .map(|_| received.recv_timeout(WAIT).expect("frame"))
        .collect();
    assert_eq!(got, sent);
}

#[rstest]
fn send_refuses_unframeable_message_without_teardown(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let connection = Connection::new("127.0.0.1", port);
    assert!(connection.connect());
    let (disconnects, on_disconnect) = counter();
    connection.add_disconnect_listener(on_disconnect);
    assert!(!connection.send(&LogMessage::new("", LogLevel::Info, "anonymous")));
    assert!(connection.is_connected());
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);
}

#[rstest]
fn connect_listener_may_send_reentrantly(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let received = spawn_collector(tcp_listener);
    let connection = Connection::new("127.0.0.1", port);
    let handle = connection.clone();
    connection.add_connect_listener(move || {
        assert!(handle.send(&message("hello from listener")));
    });
    assert!(connection.connect());
    let got = received.recv_timeout(WAIT).expect("frame");
    assert_eq!(got.text(), "hello from listener");
}

#[rstest]
fn peer_hangup_ends_receive_and_notifies_once(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let connection = Connection::new("127.0.0.1", port);
    let (disconnects, on_disconnect) = counter();
    connection.add_disconnect_listener(on_disconnect);
    assert!(connection.connect());
    let (peer, _) = tcp_listener.accept().expect("accept");
    drop(peer);
    assert!(connection.receive_next().is_none());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert!(!connection.is_connected());
    assert!(connection.receive_next().is_none());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[rstest]
fn failed_write_tears_down_and_notifies(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let connection = Connection::new("127.0.0.1", port);
    let (disconnects, on_disconnect) = counter();
    connection.add_disconnect_listener(on_disconnect);
    assert!(connection.connect());
    let (peer, _) = tcp_listener.accept().expect("accept");
    drop(peer);
    // The first writes after a hangup may still land in the socket buffer.
    let failed = wait_until(|| !connection.send(&message("into the void")));
    assert!(failed);
    assert!(!connection.is_connected());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[rstest]
fn recoverable_malformed_frame_is_skipped(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        let mut bad = Vec::new();
        bad.extend(1u16.to_be_bytes());
        bad.extend(9i32.to_be_bytes());
        bad.extend(0i64.to_be_bytes());
        bad.extend(1i32.to_be_bytes());
        bad.extend(b"c");
        bad.extend(1i32.to_be_bytes());
        bad.extend(b"x");
        stream.write_all(&bad).expect("write bad frame");
        codec::write_frame(&mut stream, &message("good")).expect("write good frame");
        stream
    });
    let (stream, _) = tcp_listener.accept().expect("accept");
    let server_side = Connection::from_stream(stream, ConnectionConfig::default());
    let got = server_side.receive_next().expect("good frame");
    assert_eq!(got.text(), "good");
    drop(client.join().expect("client thread"));
}

#[rstest]
fn unknown_version_tears_down(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream.write_all(&99u16.to_be_bytes()).expect("write");
        stream.write_all(&[0u8; 32]).expect("write");
        stream
    });
    let (stream, _) = tcp_listener.accept().expect("accept");
    let server_side = Connection::from_stream(stream, ConnectionConfig::default());
    let (disconnects, on_disconnect) = counter();
    server_side.add_disconnect_listener(on_disconnect);
    assert!(server_side.receive_next().is_none());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    drop(client.join().expect("client thread"));
}

#[rstest]
fn close_is_idempotent_and_silent(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let connection = Connection::new("127.0.0.1", port);
    let (connects, on_connect) = counter();
    let (disconnects, on_disconnect) = counter();
    connection.add_connect_listener(on_connect);
    connection.add_disconnect_listener(on_disconnect);
    assert!(connection.connect());
    connection.close();
    connection.close();
    assert!(connection.is_closed());
    assert!(!connection.is_connected());
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    assert!(!connection.connect());
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);
}

#[rstest]
fn close_unblocks_pending_receive(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let connection = Connection::new("127.0.0.1", port);
    assert!(connection.connect());
    let _peer = tcp_listener.accept().expect("accept");
    let reader = connection.clone();
    let blocked = thread::spawn(move || reader.receive_next());
    thread::sleep(Duration::from_millis(50));
    connection.close();
    let result = blocked.join().expect("reader thread");
    assert!(result.is_none());
}

#[rstest]
fn endpoint_changes_apply_on_next_connect(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let connection = Connection::new("localhost.invalid", closed_port());
    connection.set_host("127.0.0.1");
    connection.set_port(port);
    assert_eq!(connection.label(), format!("tcp://127.0.0.1:{port}"));
    assert!(connection.connect());
}

#[rstest]
fn reconnects_once_server_appears() {
    let port = closed_port();
    let connection = ReconnectingConnection::with_interval("127.0.0.1", port, Duration::from_millis(20));
    let (connected, on_connect) = signal();
    connection.add_connect_listener(on_connect);
    assert!(!connection.connect());
    assert!(wait_until(|| connection.state() == ConnectionState::Reconnecting));

    let listener = TcpListener::bind(("127.0.0.1", port)).expect("rebind port");
    connected.recv_timeout(WAIT).expect("reconnected");
    assert!(connection.is_connected());
    assert!(wait_until(|| !connection.is_reconnecting()));
    drop(listener);
}

#[rstest]
fn reconnects_after_peer_hangup(tcp_listener: TcpListener) {
    let port = tcp_listener.local_addr().expect("addr").port();
    let connection = ReconnectingConnection::with_interval("127.0.0.1", port, Duration::from_millis(20));
    let (connected, on_connect) = signal();
    connection.add_connect_listener(on_connect);
    assert!(connection.connect());
    connected.recv_timeout(WAIT).expect("first connect");

    let (first, _) = tcp_listener.accept().expect("accept first");
    drop(first);
    assert!(connection.receive_next().is_none());
    let _second = tcp_listener.accept().expect("accept second");
    connected.recv_timeout(WAIT).expect("second connect");
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[rstest]
fn repeated_disconnects_run_a_single_loop() {
    let connection =
        ReconnectingConnection::with_interval("127.0.0.1", closed_port(), Duration::from_millis(20));
    let (connects, on_connect) = counter();
    connection.add_connect_listener(on_connect);
    for _ in 0..5 {
        assert!(!connection.connect());
    }
    assert!(connection.is_reconnecting());
    connection.close();
    assert!(!connection.is_reconnecting());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(connects.load(Ordering::SeqCst), 0);
}

#[rstest]
fn close_stops_retrying() {
    let port = closed_port();
    let connection = ReconnectingConnection::with_interval("127.0.0.1", port, Duration::from_millis(20));
    let (connects, on_connect) = counter();
    connection.add_connect_listener(on_connect);
    assert!(!connection.connect());
    connection.close();
    connection.close();
    let _listener = TcpListener::bind(("127.0.0.1", port)).expect("rebind port");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert!(!connection.is_connected());
}

#[rstest]
fn disconnect_while_retry_loop_winds_down_restarts_it() {
    let port = closed_port();
    let connection = ReconnectingConnection::with_interval("127.0.0.1", port, Duration::from_millis(20));
    let (connected, on_connect) = signal();
    connection.add_connect_listener(on_connect);
    assert!(!connection.is_reconnecting());

    // The link is already gone when the loop retires after its last tick.
    connection.settle_retry();
    assert!(connection.is_reconnecting());
    assert!(connected.try_recv().is_err());

    let _listener = TcpListener::bind(("127.0.0.1", port)).expect("rebind port");
    connected.recv_timeout(WAIT).expect("reconnected");
    assert!(connection.is_connected());
    assert!(wait_until(|| !connection.is_reconnecting()));
    connection.close();
}
