//! Durable cache that survives process restarts.

use std::{
    io,
    path::{Path, PathBuf},
};

use crate::{
    format::SpeedFormatter,
    log_message::LogMessage,
    store::{FormattedLogAdapter, LogAdapter},
};

use super::CacheStrategy;

/// Cache appending one speed-format record per message to a file.
///
/// Unparsable lines are skipped on load so one corrupted record does not
/// cost the rest of the backlog.
pub struct FileCache {
    path: PathBuf,
    adapter: FormattedLogAdapter<SpeedFormatter>,
}

impl FileCache {
    /// Open or create the cache file at `path`. Existing records are kept
    /// and will be replayed on the next drain.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let adapter = FormattedLogAdapter::open(&path, SpeedFormatter)?;
        Ok(Self { path, adapter })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStrategy for FileCache {
    fn save(&mut self, message: &LogMessage) -> bool {
        self.adapter.save_log_message(message)
    }

    fn retrieve_all(&mut self) -> Vec<LogMessage> {
        self.adapter.load_log_messages(usize::MAX)
    }

    fn clear(&mut self) -> bool {
        self.adapter.clear()
    }
}
