//! Tests for the logger facade and factory.

use std::{net::TcpListener, sync::Arc};

use parking_lot::Mutex;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

fn recording(min_level: Option<LogLevel>) -> (Logger, Arc<Mutex<Vec<LogMessage>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let logger = Logger::new(
        Arc::new(move |message: LogMessage| sink.lock().push(message)),
        "svc",
        min_level,
    );
    (logger, seen)
}

#[fixture]
fn dir() -> TempDir {
    tempfile::tempdir().expect("tempdir")
}

#[rstest]
fn level_helpers_stamp_client_and_level() {
    let (logger, seen) = recording(None);
    logger.debug("d");
    logger.info("i");
    logger.warning("w");
    logger.error("e");
    logger.critical("c");
    let levels: Vec<_> = seen.lock().iter().map(LogMessage::level).collect();
    assert_eq!(levels, LogLevel::ALL);
    assert!(seen.lock().iter().all(|m| m.client_name() == "svc"));
}

#[rstest]
#[case(LogLevel::Debug, 5)]
#[case(LogLevel::Warning, 3)]
#[case(LogLevel::Critical, 1)]
fn minimum_level_filters_locally(#[case] min: LogLevel, #[case] expected: usize) {
    let (logger, seen) = recording(Some(min));
    for level in LogLevel::ALL {
        logger.log(level, "x");
    }
    assert_eq!(seen.lock().len(), expected);
    assert!(seen.lock().iter().all(|m| m.level() >= min));
}

#[rstest]
#[case("localhost:50000", "localhost", 50000)]
#[case("10.0.0.7:9", "10.0.0.7", 9)]
#[case(" collector.example-1:65535 ", "collector.example-1", 65535)]
fn parses_destinations(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
    let (parsed_host, parsed_port) = parse_destination(input).expect("valid destination");
    assert_eq!(parsed_host, host);
    assert_eq!(parsed_port, port);
}

#[rstest]
#[case("localhost")]
#[case(":50000")]
#[case("localhost:")]
#[case("localhost:0")]
#[case("localhost:70000")]
#[case("local host:1")]
#[case("host:port")]
fn rejects_bad_destinations(#[case] input: &str) {
    assert!(matches!(
        parse_destination(input),
        Err(LoggerSetupError::InvalidDestination(_))
    ));
}

#[rstest]
fn factory_rejects_bad_client_names(dir: TempDir) {
    let factory = LoggerFactory::new().with_cache_dir(dir.path());
    assert!(matches!(
        factory.get_logger("127.0.0.1:1", "", None),
        Err(LoggerSetupError::EmptyClientName)
    ));
    assert!(matches!(
        factory.get_logger("127.0.0.1:1", "../escape", None),
        Err(LoggerSetupError::InvalidClientName(_))
    ));
}

#[rstest]
fn factory_uses_per_client_cache_file(dir: TempDir) {
    let factory = LoggerFactory::new().with_cache_dir(dir.path().join("tmp"));
    assert_eq!(
        factory.cache_path("alpha"),
        dir.path().join("tmp").join("cache_alpha.log")
    );
}

#[rstest]
fn factory_logger_caches_until_collector_is_up(dir: TempDir) {
    let port = {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let factory = LoggerFactory::new().with_cache_dir(dir.path());
    let logger = factory
        .get_logger(&format!("127.0.0.1:{port}"), "alpha", Some(LogLevel::Info))
        .expect("logger");
    logger.debug("filtered");
    logger.info("cached");
    let cached = std::fs::read_to_string(factory.cache_path("alpha")).expect("cache file");
    assert_eq!(cached.lines().count(), 1);
    assert!(cached.contains("Message: cached"));
}
