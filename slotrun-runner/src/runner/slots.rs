// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::job::SlotId;
use std::collections::BTreeSet;

/// The free slot tokens of a run, numbered `1..=N`.
///
/// The lowest free slot is always handed out first, so that a run with little contention keeps
/// reusing the same few slots.
#[derive(Clone, Debug)]
pub(super) struct SlotPool {
    free: BTreeSet<usize>,
    count: usize,
}

impl SlotPool {
    pub(super) fn new(count: usize) -> Self {
        Self {
            free: (1..=count).collect(),
            count,
        }
    }

    pub(super) fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    pub(super) fn acquire(&mut self) -> Option<SlotId> {
        self.free.pop_first().map(SlotId::new)
    }

    /// Returns `slot` to the pool.
    ///
    /// Returns false if the slot was already free or isn't part of this pool.
    pub(super) fn release(&mut self, slot: SlotId) -> bool {
        let slot = slot.get();
        (1..=self.count).contains(&slot) && self.free.insert(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_free_slot_first() {
        let mut pool = SlotPool::new(3);
        let slots: Vec<_> = std::iter::from_fn(|| pool.acquire()).collect();
        assert_eq!(slots, [SlotId::new(1), SlotId::new(2), SlotId::new(3)]);
        assert!(!pool.has_free());

        assert!(pool.release(SlotId::new(2)));
        assert!(!pool.release(SlotId::new(2)), "double release is rejected");
        assert!(!pool.release(SlotId::new(4)), "foreign slot is rejected");
        assert_eq!(pool.acquire(), Some(SlotId::new(2)));
        assert_eq!(pool.acquire(), None);
    }
}
