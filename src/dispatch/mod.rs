//! Worker loops draining the cache and network queues.
//!
//! Each worker blocks only on its queue's `take`; stopping interrupts that
//! wait and never an item already being processed.

mod cache;
mod network;

pub use cache::CacheDispatcher;
pub use network::NetworkDispatcher;
