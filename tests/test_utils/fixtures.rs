//! A loopback collector for end-to-end tests.
//!
//! [`Collector`] runs a real [`LoggerServer`] writing to a temporary log
//! file and exposes a viewer subscription so tests can observe messages
//! as the server publishes them.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener},
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, unbounded};
use logwire::{
    FormattedLogAdapter, LogAdapter, LogFormat, LogMessage, LoggerServer, RunningServer,
    ServerConfig, ViewerDispatcher,
};
use rstest::fixture;
use tempfile::TempDir;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Collector {
    pub server: RunningServer,
    pub adapter: Arc<FormattedLogAdapter>,
    pub dispatcher: Arc<ViewerDispatcher>,
    pub viewer: Receiver<LogMessage>,
    pub log_file: PathBuf,
    pub dir: TempDir,
}

impl Collector {
    /// Start a collector on `port` (0 picks a free one).
    pub fn start(port: u16, format: LogFormat) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_file = dir.path().join("collector.log");
        let adapter =
            Arc::new(FormattedLogAdapter::open_with_format(&log_file, format).expect("open log"));
        let dispatcher = Arc::new(ViewerDispatcher::new());
        let (tx, viewer) = unbounded();
        dispatcher.subscribe(tx);
        let config = ServerConfig {
            listen_port: port,
            interface: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            log_format: format,
            log_file: log_file.clone(),
            ..ServerConfig::default()
        };
        let server = LoggerServer::start(&config, adapter.clone(), Arc::clone(&dispatcher))
            .expect("start collector");
        Self {
            server,
            adapter,
            dispatcher,
            viewer,
            log_file,
            dir,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn destination(&self) -> String {
        format!("127.0.0.1:{}", self.addr().port())
    }

    /// Next `count` messages published to viewers.
    pub fn next_messages(&self, count: usize) -> Vec<LogMessage> {
        (0..count)
            .map(|_| self.viewer.recv_timeout(WAIT).expect("message published"))
            .collect()
    }

    pub fn persisted(&self) -> Vec<LogMessage> {
        self.adapter.load_log_messages(usize::MAX)
    }
}

/// A collector using the default competition format.
#[fixture]
pub fn collector() -> Collector {
    Collector::start(0, LogFormat::Competition)
}

/// A loopback port nothing is listening on right now.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    listener.local_addr().expect("addr").port()
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
