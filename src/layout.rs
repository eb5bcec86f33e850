//! Static layout facts for one table type.

use serde::{Deserialize, Serialize};

/// Slots per metadata group. Fixed by the table's in-memory format and never
/// varies per instance.
pub const GROUP_CAPACITY: usize = 15;

/// Bytes per metadata group block: one byte per slot plus a trailing
/// overflow/continuation byte (meaningful only in the scalar layout).
pub const GROUP_METADATA_LEN: usize = GROUP_CAPACITY + 1;

/// How the table stores its slot metadata: plain bytes or atomic-wrapped
/// bytes (the concurrent table variant). Reads are identical either way;
/// for `Atomic` the emitted element set is best-effort under mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStorage {
    /// Ordinary byte storage.
    Plain,
    /// Atomic-wrapped storage used by the concurrent table variant.
    Atomic,
}

/// Pointer representation used by the table's internal arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    /// Native machine addresses.
    Raw,
    /// Author-defined handle types resolved through a registered capability.
    Opaque,
}

/// Whether the table maps keys to values or stores bare keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Key/value table; records are keyed by the key's display text.
    Map,
    /// Key-only table; records are keyed by a running zero-based index.
    Set,
}

/// Static facts about one table instance, obtained once per table type.
///
/// Immutable for the lifetime of an inspection session; one descriptor
/// governs every group record and cursor built for that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    /// Metadata encoded for wide lane-parallel comparison when true,
    /// byte-at-a-time scalar encoding when false.
    pub vectorized: bool,
    /// Slot metadata storage flavor.
    pub slot_storage: SlotStorage,
    /// Pointer representation of the group/element arrays.
    pub pointer_kind: PointerKind,
    /// Map or set presentation role.
    pub role: Role,
}

impl LayoutDescriptor {
    /// Descriptor for the common case: vectorized metadata, plain slots,
    /// raw pointers.
    pub fn new(role: Role) -> Self {
        Self {
            vectorized: true,
            slot_storage: SlotStorage::Plain,
            pointer_kind: PointerKind::Raw,
            role,
        }
    }

    /// Switches to the scalar metadata encoding.
    pub fn scalar(mut self) -> Self {
        self.vectorized = false;
        self
    }

    /// Marks the table as the concurrent (atomic-slot) variant.
    pub fn atomic(mut self) -> Self {
        self.slot_storage = SlotStorage::Atomic;
        self
    }

    /// Marks the table's arrays as reachable only through opaque handles.
    pub fn opaque(mut self) -> Self {
        self.pointer_kind = PointerKind::Opaque;
        self
    }
}
