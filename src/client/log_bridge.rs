//! Bridge from the `log` facade into a [`Logger`].
//!
//! Lets an application route its own `log::info!` and friends through the
//! pipeline. Records emitted by this crate are never forwarded, since the
//! send path itself logs and would otherwise feed back into the queue.

use log::{LevelFilter, Metadata, Record, SetLoggerError};

use crate::level::LogLevel;

use super::Logger;

const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// `log::Log` implementation forwarding records to a [`Logger`].
pub struct LogBridge {
    logger: Logger,
}

impl LogBridge {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Install as the process-wide `log` backend.
    ///
    /// Fails when another logger has already been installed.
    pub fn install(self, max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

fn is_own_record(target: &str) -> bool {
    target == OWN_TARGET || target.starts_with(&format!("{OWN_TARGET}::"))
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        !is_own_record(metadata.target()) && self.logger.is_enabled(metadata.level().into())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = LogLevel::from(record.level());
        self.logger.log(level, record.args().to_string());
    }

    fn flush(&self) {}
}
