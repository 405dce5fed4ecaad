//! Timer-id allocation.

use std::cell::Cell;

use crate::task::TimerId;
use crate::{Error, Result};

/// Issues strictly increasing timer ids, starting at 1.
///
/// Ids are never handed out twice by the same allocator, including across
/// `EventLoop::reset`, so an id kept from an earlier session cannot cancel
/// a task of the next one.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: Cell<u64>,
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: Cell::new(0) }
    }

    /// Create an allocator that continues after `last`.
    #[cfg(test)]
    #[must_use]
    pub const fn starting_after(last: u64) -> Self {
        Self {
            last: Cell::new(last),
        }
    }

    /// Issue the next id.
    ///
    /// # Errors
    ///
    /// Returns `Error::IdSpaceExhausted` once `u64::MAX` has been issued.
    pub fn next_id(&self) -> Result<TimerId> {
        let next = self
            .last
            .get()
            .checked_add(1)
            .ok_or(Error::IdSpaceExhausted)?;
        self.last.set(next);
        Ok(TimerId::from_raw(next))
    }
}
