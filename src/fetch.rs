//! Hydration of search hits into entities.
//!
//! A search hands its ranked page to [`FetchPool::submit`]. The first
//! [`initial_window`] hits are hydrated on the calling thread; the rest is
//! queued for the background workers, and the [`SearchResult`] is marked
//! finished once the last hit has been processed.
//!
//! [`SearchResult`]: crate::search::SearchResult

pub mod payload;
pub mod pool;

use rand::Rng;

pub use payload::FetchPayload;
pub use pool::FetchPool;

/// Number of hits hydrated before a search returns: `floor` plus a random
/// share of `budget`.
pub fn initial_window(floor: usize, budget: usize) -> usize {
    if budget == 0 {
        return floor;
    }
    floor + rand::rng().random_range(0..budget)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_window_bounds() {
        for _ in 0..200 {
            let window = initial_window(20, 20);
            assert!((20..40).contains(&window), "window {window}");
        }
        assert_eq!(initial_window(5, 0), 5);
        assert_eq!(initial_window(0, 1), 0);
    }
}
