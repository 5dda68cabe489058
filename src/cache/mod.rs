//! Backlog storage for messages that could not be sent yet.
//!
//! A [`CacheStrategy`] is owned by a send queue and only ever touched under
//! that queue's lock, so implementations take `&mut self` and need no
//! synchronisation of their own.

mod file;
mod memory;


pub use file::FileCache;
pub use memory::MemoryCache;

use crate::log_message::LogMessage;

/// Ordered backlog of undelivered messages.
pub trait CacheStrategy: Send {
    /// Append `message`; `false` means it is not guaranteed to be retained.
    fn save(&mut self, message: &LogMessage) -> bool;

    /// Every cached message in save order. Does not remove anything.
    fn retrieve_all(&mut self) -> Vec<LogMessage>;

    /// Drop every cached message.
    fn clear(&mut self) -> bool;
}

impl<T: CacheStrategy + ?Sized> CacheStrategy for Box<T> {
    fn save(&mut self, message: &LogMessage) -> bool {
        (**self).save(message)
    }

    fn retrieve_all(&mut self) -> Vec<LogMessage> {
        (**self).retrieve_all()
    }

    fn clear(&mut self) -> bool {
        (**self).clear()
    }
}
