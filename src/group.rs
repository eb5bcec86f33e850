//! Decoding of one fixed-size group metadata block.
//!
//! The same logical predicates (occupied, sentinel) exist in two physical
//! encodings. Which one applies is a plain branch on the descriptor's
//! `vectorized` flag, selected once per traversal; both decodings are total
//! over arbitrary input bytes. Applying the wrong decoding yields wrong
//! answers, never a failure to evaluate.

use crate::error::Result;
use crate::layout::{LayoutDescriptor, GROUP_CAPACITY, GROUP_METADATA_LEN};
use crate::memory::MemoryAccessor;

/// Mask covering the 15 slot bits of a group; bit 15 is never a slot.
pub const SLOT_MASK: u16 = (1 << GROUP_CAPACITY as u16) - 1;

/// Vectorized encoding: a slot byte of zero is empty.
const VEC_EMPTY: u8 = 0x00;
/// Vectorized encoding: the table-end marker.
const VEC_SENTINEL: u8 = 0x01;
/// Scalar encoding: a slot byte of zero is empty.
const SCALAR_EMPTY: u8 = 0x00;
/// Scalar encoding: the table-end marker.
const SCALAR_SENTINEL: u8 = 0xFF;

/// What one group's metadata says about its 15 slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupClass {
    /// Ordinary group with the given occupancy mask (possibly zero: an
    /// empty group contributes no elements but does not end the table).
    Live(u16),
    /// Every slot carries the table-end marker; traversal stops cleanly.
    Sentinel,
    /// Some but not all slots carry the table-end marker. Only ever
    /// produced by corrupted or mid-mutation metadata.
    Malformed,
}

/// One group's metadata bytes, re-read fresh from target memory each time a
/// traversal enters the group. Never cached across refresh requests.
#[derive(Debug, Clone, Copy)]
pub struct GroupRecord {
    bytes: [u8; GROUP_METADATA_LEN],
}

impl GroupRecord {
    /// Wraps an already-fetched metadata block.
    pub fn from_bytes(bytes: [u8; GROUP_METADATA_LEN]) -> Self {
        Self { bytes }
    }

    /// Reads the block for group `index` from the metadata array at `base`.
    pub fn read<A: MemoryAccessor + ?Sized>(accessor: &A, base: u64, index: u64) -> Result<Self> {
        let mut bytes = [0u8; GROUP_METADATA_LEN];
        // Wrapping arithmetic: a corrupt group count yields a failing read,
        // not an overflow panic.
        let addr = base.wrapping_add(index.wrapping_mul(GROUP_METADATA_LEN as u64));
        accessor.read(addr, &mut bytes)?;
        Ok(Self { bytes })
    }

    /// The raw metadata byte for slot `slot` (0..15).
    pub fn slot_byte(&self, slot: usize) -> u8 {
        self.bytes[slot]
    }

    /// The trailing overflow/continuation byte. Carries meaning only in the
    /// scalar layout; reserved in the vectorized layout.
    pub fn overflow_byte(&self) -> u8 {
        self.bytes[GROUP_CAPACITY]
    }

    /// Bitmask of occupied slots, bit `i` for slot `i`. Sentinel slots are
    /// not occupied. Bit 15 is never set.
    pub fn occupied_mask(&self, descriptor: &LayoutDescriptor) -> u16 {
        let mut mask = 0u16;
        for slot in 0..GROUP_CAPACITY {
            if slot_occupied(self.bytes[slot], descriptor) {
                mask |= 1 << slot;
            }
        }
        mask
    }

    /// Bitmask of slots carrying the table-end marker.
    pub fn sentinel_mask(&self, descriptor: &LayoutDescriptor) -> u16 {
        let mut mask = 0u16;
        for slot in 0..GROUP_CAPACITY {
            if is_sentinel_slot(self.bytes[slot], descriptor) {
                mask |= 1 << slot;
            }
        }
        mask
    }

    /// Classifies the group. A fully-sentinel group ends the table; a
    /// partially-sentinel group is corruption, reported so the caller can
    /// truncate rather than walk garbage.
    pub fn classify(&self, descriptor: &LayoutDescriptor) -> GroupClass {
        match self.sentinel_mask(descriptor) {
            0 => GroupClass::Live(self.occupied_mask(descriptor)),
            SLOT_MASK => GroupClass::Sentinel,
            _ => GroupClass::Malformed,
        }
    }
}

/// True when `byte` marks an occupied slot under the descriptor's encoding.
pub fn slot_occupied(byte: u8, descriptor: &LayoutDescriptor) -> bool {
    if descriptor.vectorized {
        byte != VEC_EMPTY && byte != VEC_SENTINEL
    } else {
        byte != SCALAR_EMPTY && byte != SCALAR_SENTINEL
    }
}

/// True when `byte` is the table-end marker under the descriptor's encoding.
pub fn is_sentinel_slot(byte: u8, descriptor: &LayoutDescriptor) -> bool {
    if descriptor.vectorized {
        byte == VEC_SENTINEL
    } else {
        byte == SCALAR_SENTINEL
    }
}

/// Encodes an occupied slot byte for fixtures: a reduced-hash-looking value
/// valid in either layout.
pub fn occupied_byte(seed: u8) -> u8 {
    // 0x02..=0xFE avoids empty and both sentinel values.
    0x02 + seed % 0xFD
}

/// The sentinel byte for the given layout. Fixture-side counterpart of
/// [`is_sentinel_slot`].
pub fn sentinel_byte(descriptor: &LayoutDescriptor) -> u8 {
    if descriptor.vectorized {
        VEC_SENTINEL
    } else {
        SCALAR_SENTINEL
    }
}
