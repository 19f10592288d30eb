use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Gauges shared between the paths and the enclosing server.
///
/// Incremented when a client enters `Play`/`Record`, decremented when it
/// leaves, including via forced teardown. Paths only ever move them in
/// balanced pairs.
#[derive(Debug, Default)]
pub struct Stats {
    pub count_readers: AtomicI64,
    pub count_publishers: AtomicI64,
}

impl Stats {
    pub fn new() -> Arc<Stats> {
        Arc::new(Stats::default())
    }

    pub fn readers(&self) -> i64 {
        self.count_readers.load(Ordering::SeqCst)
    }

    pub fn publishers(&self) -> i64 {
        self.count_publishers.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::new();
        assert_eq!(stats.readers(), 0);
        assert_eq!(stats.publishers(), 0);
    }

    #[test]
    fn counters_move_in_pairs() {
        let stats = Stats::new();
        stats.count_readers.fetch_add(1, Ordering::SeqCst);
        stats.count_publishers.fetch_add(1, Ordering::SeqCst);
        assert_eq!(stats.readers(), 1);
        assert_eq!(stats.publishers(), 1);

        stats.count_readers.fetch_sub(1, Ordering::SeqCst);
        stats.count_publishers.fetch_sub(1, Ordering::SeqCst);
        assert_eq!(stats.readers(), 0);
        assert_eq!(stats.publishers(), 0);
    }
}
