use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running total of bytes moved by all workers of one phase.
///
/// Cloning hands out another handle to the same total. A new phase gets a new
/// counter.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter {
    total: Arc<AtomicU64>,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` bytes and returns the total including them.
    pub fn add(&self, n: u64) -> u64 {
        self.total.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn snapshot(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}
