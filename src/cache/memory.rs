use crate::log_message::LogMessage;

use super::CacheStrategy;

/// Volatile cache; the backlog is lost with the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    messages: Vec<LogMessage>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl CacheStrategy for MemoryCache {
    fn save(&mut self, message: &LogMessage) -> bool {
        self.messages.push(message.clone());
        true
    }

    fn retrieve_all(&mut self) -> Vec<LogMessage> {
        self.messages.clone()
    }

    fn clear(&mut self) -> bool {
        self.messages.clear();
        true
    }
}
