//! Rotating start position for round-robin placement.
//!
//! Each round-robin call starts one server further along than the last,
//! so a stream of single-region assignments does not pile onto the first
//! server in the list. Lock-free and safe for concurrent access.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out server visiting orders, each shifted by one from the last.
#[derive(Default)]
pub struct RoundRobinCursor {
    calls: AtomicUsize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices `0..count` in visiting order for this call, wrapping around.
    ///
    /// Empty when `count` is zero; the cursor does not advance then.
    pub fn rotation(&self, count: usize) -> impl Iterator<Item = usize> {
        let start = if count == 0 {
            0
        } else {
            self.calls.fetch_add(1, Ordering::Relaxed) % count
        };
        (0..count).map(move |i| (start + i) % count)
    }
}
