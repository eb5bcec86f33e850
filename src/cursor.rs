//! The traversal state machine.
//!
//! The cursor is pure state: it never touches target memory. The driving
//! engine reads and classifies group metadata whenever the cursor asks for a
//! group, then feeds the occupancy mask back in. Total steps are bounded by
//! `group_count * (GROUP_CAPACITY + 1)` whatever the memory contains, so
//! corrupt or concurrently-mutated metadata can produce wrong output but
//! never non-termination.

use crate::group::SLOT_MASK;
use crate::layout::GROUP_CAPACITY;

/// Index of the lowest set bit of `mask`, or the mask's bit width (32) for a
/// zero mask.
///
/// A fixed-depth cascade of bit tests rather than a count-trailing-zeros
/// intrinsic: the same shape evaluates in hosts with no such primitive.
pub fn lowest_set_bit_index(mask: u32) -> u32 {
    if mask == 0 {
        return u32::BITS;
    }
    let mut index = 0u32;
    let mut rest = mask;
    if rest & 0xFFFF == 0 {
        index += 16;
        rest >>= 16;
    }
    if rest & 0xFF == 0 {
        index += 8;
        rest >>= 8;
    }
    if rest & 0xF == 0 {
        index += 4;
        rest >>= 4;
    }
    if rest & 0x3 == 0 {
        index += 2;
        rest >>= 2;
    }
    if rest & 0x1 == 0 {
        index += 1;
    }
    index
}

/// What the cursor wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Emit the element at the given group and slot.
    Emit {
        /// Group index of the element.
        group: u64,
        /// Slot index within the group, `0..GROUP_CAPACITY`.
        slot: u32,
    },
    /// The caller must read this group's record, classify it, and call
    /// [`TraversalCursor::load_group`] (or [`TraversalCursor::finish`]).
    NeedGroup(u64),
    /// No further elements. Idempotent: stepping again yields `Exhausted`
    /// forever, with no error.
    Exhausted,
}

/// Walks groups and occupancy bits, emitting one element position at a time.
///
/// Invariants: `group_index <= group_count`; the remaining mask only holds
/// bits of the current group that are occupied and not yet emitted.
#[derive(Debug)]
pub struct TraversalCursor {
    group_index: u64,
    group_count: u64,
    remaining: u32,
    loaded: bool,
}

impl TraversalCursor {
    /// A cursor over `group_count` groups, positioned before group 0.
    pub fn new(group_count: u64) -> Self {
        Self {
            group_index: 0,
            group_count,
            remaining: 0,
            loaded: false,
        }
    }

    /// Advances the state machine by one transition.
    pub fn step(&mut self) -> Step {
        if !self.loaded {
            return if self.group_index < self.group_count {
                Step::NeedGroup(self.group_index)
            } else {
                Step::Exhausted
            };
        }
        if self.remaining != 0 {
            let slot = lowest_set_bit_index(self.remaining);
            self.remaining &= !(1u32 << slot);
            return Step::Emit {
                group: self.group_index,
                slot,
            };
        }
        self.loaded = false;
        self.group_index += 1;
        if self.group_index < self.group_count {
            Step::NeedGroup(self.group_index)
        } else {
            Step::Exhausted
        }
    }

    /// Supplies the occupancy mask of the group last requested via
    /// [`Step::NeedGroup`]. Bits above the slot range are discarded.
    pub fn load_group(&mut self, occupied: u16) {
        self.remaining = u32::from(occupied & SLOT_MASK);
        self.loaded = true;
    }

    /// Forces the terminal state (sentinel group reached, or truncation).
    pub fn finish(&mut self) {
        self.group_index = self.group_count;
        self.remaining = 0;
        self.loaded = false;
    }

    /// Global slot index of `(group, slot)` in the element array.
    pub fn global_slot(group: u64, slot: u32) -> u64 {
        group * GROUP_CAPACITY as u64 + u64::from(slot)
    }
}
