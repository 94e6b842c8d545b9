//! Dispatch Cursor
//!
//! The round-robin position shared by every concurrent `dispatch` call.
//! Each call takes its starting position with one atomic read-modify-write,
//! so two calls never receive the same rotation position. A call that skips
//! past overloaded machines then moves the cursor to the machine it chose,
//! unless another call has moved it in the meantime.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct DispatchCursor {
    /// Index of the last candidate handed out
    position: AtomicUsize,
}

impl DispatchCursor {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn starting_at(position: usize) -> Self {
        Self {
            position: AtomicUsize::new(position),
        }
    }

    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    /// Move one step forward in a rotation of `len` and return the new index
    pub fn advance(&self, len: usize) -> usize {
        debug_assert!(len > 0, "cursor advanced over an empty rotation");

        let previous = match self.position.fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
            Some(step(p, len))
        }) {
            Ok(previous) | Err(previous) => previous,
        };

        step(previous, len)
    }

    /// Move the cursor from `start` to `chosen`
    ///
    /// Returns false when another call advanced the cursor after `start` was
    /// handed out; that call's position is kept.
    pub fn catch_up(&self, start: usize, chosen: usize) -> bool {
        start == chosen
            || self
                .position
                .compare_exchange(start, chosen, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

fn step(position: usize, len: usize) -> usize {
    (position % len + 1) % len
}
