//! Thread-safe sequence counter for outbound frame numbering.
//!
//! Every frame the console sends carries a monotonically increasing
//! sequence number in its header. The panel uses it purely for
//! diagnostics: spotting a gap in its logs means a command was lost in
//! transit. Nothing at this layer reorders or retransmits.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter shared between the dispatcher and the
/// sync loop, so all outbound traffic is numbered from one series.
///
/// Starts at 0 and wraps at `u64::MAX` without panicking.
///
/// # Examples
///
/// ```rust
/// use canpanel_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence number and increments the counter.
    ///
    /// `Relaxed` ordering suffices: the number only labels a frame, it
    /// carries no cross-thread synchronisation.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the current value without incrementing. For logging.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequence_counter_starts_at_zero() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn test_sequence_counter_wraps_at_u64_max() {
        let counter = SequenceCounter {
            inner: AtomicU64::new(u64::MAX),
        };
        assert_eq!(counter.next(), u64::MAX);
        assert_eq!(counter.next(), 0, "counter must wrap to 0 after u64::MAX");
    }

    #[test]
    fn test_current_does_not_increment() {
        let counter = SequenceCounter::new();
        counter.next();
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn test_sequence_numbers_are_unique_across_threads() {
        let counter = Arc::new(SequenceCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..1000).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 1000, "no two frames may share a number");
    }
}
