//! Tabulens reconstructs the logical contents of an open-addressing hash
//! table from its raw in-memory layout, for display inside an inspecting
//! host. It walks the table's group metadata to recover live elements in
//! physical order, resolves plain-address and opaque-handle pointer
//! representations through a capability registry, and derives statistics
//! from the table's built-in counters.
//!
//! The engine is strictly read-only and never executes code belonging to
//! the inspected structure. Against a concurrently mutated table it stays
//! bounded and panic-free, but the emitted element set is best-effort.

#![warn(missing_docs)]

pub mod cursor;
pub mod engine;
pub mod error;
pub mod fixture;
pub mod format;
pub mod group;
pub mod layout;
pub mod memory;
pub mod pointer;
pub mod stats;

pub use engine::{InspectOptions, Inspector, TableHandle, Traversal};
pub use error::{InspectError, Result};
pub use format::{DisplayKey, DisplayRecord, ElementDecoder, U64Decoder, U64PairDecoder};
pub use layout::{LayoutDescriptor, PointerKind, Role, SlotStorage, GROUP_CAPACITY};
pub use memory::{MemoryAccessor, MemoryImage};
pub use pointer::{
    CapabilityRegistry, OpaqueHandle, PointerCapability, PointerHandle, PointerKindReport, TypeKey,
};
pub use stats::{DerivedStats, MetricKind, StatsSample};
