pub mod fixtures;

pub use fixtures::{Collector, collector, free_port, wait_until};
