//! The inspector facade: traversal, stats, and pointer-kind queries over one
//! table handle.
//!
//! A traversal resolves the table's group and element pointers to concrete
//! addresses exactly once, then walks in plain address arithmetic; opaque
//! handles are never carried as iteration state. Nothing is cached across
//! requests, nothing in target memory is ever written, and every request
//! re-runs from scratch.

use tracing::{debug, warn};

use crate::cursor::{Step, TraversalCursor};
use crate::error::{InspectError, Result};
use crate::format::{DisplayRecord, ElementDecoder, Formatter};
use crate::group::{GroupClass, GroupRecord};
use crate::layout::{LayoutDescriptor, PointerKind};
use crate::memory::MemoryAccessor;
use crate::pointer::{
    advance_address, resolve_address, CapabilityRegistry, PointerCapability, PointerHandle,
    PointerKindReport, RawCapability, TypeKey,
};
use crate::stats::{derive, DerivedStats, MetricKind, StatsSample};

/// Tuning knobs for one inspector, with the defaults most hosts want.
#[derive(Debug, Clone, Copy)]
pub struct InspectOptions {
    /// Bound on nested opaque pointer layers during resolution.
    pub max_resolve_depth: usize,
    /// Cap on records emitted per traversal; `None` walks every group.
    pub element_limit: Option<usize>,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            max_resolve_depth: 8,
            element_limit: None,
        }
    }
}

impl InspectOptions {
    /// Preset for interactive display hosts: capped output per refresh.
    pub fn interactive() -> Self {
        Self {
            max_resolve_depth: 8,
            element_limit: Some(4096),
        }
    }
}

/// Everything the engine needs to know about one table instance: its layout
/// descriptor, where its metadata and element arrays live, and optionally
/// where its stats block sits.
#[derive(Debug, Clone)]
pub struct TableHandle {
    /// Static layout facts for this table's type.
    pub descriptor: LayoutDescriptor,
    /// Pointer to the group metadata array.
    pub groups: PointerHandle,
    /// Pointer to the element array.
    pub elements: PointerHandle,
    /// Number of metadata groups.
    pub group_count: u64,
    /// Size of one element in bytes.
    pub element_size: u64,
    /// Address of the table's stats block, when it tracks metrics.
    pub stats: Option<u64>,
}

/// The introspection engine over one memory accessor.
pub struct Inspector<A: MemoryAccessor> {
    accessor: A,
    registry: CapabilityRegistry,
    options: InspectOptions,
}

impl<A: MemoryAccessor> Inspector<A> {
    /// An inspector with an empty capability registry and default options.
    pub fn new(accessor: A) -> Self {
        Self::with_options(accessor, InspectOptions::default())
    }

    /// An inspector with explicit options.
    pub fn with_options(accessor: A, options: InspectOptions) -> Self {
        Self {
            accessor,
            registry: CapabilityRegistry::new(),
            options,
        }
    }

    /// The capability registry, for startup-time registration.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Reports how handles of `type_key` can be interpreted.
    pub fn describe_pointer_kind(&self, type_key: &TypeKey) -> PointerKindReport {
        self.registry.describe(type_key)
    }

    /// Starts a traversal of `table`, yielding display records lazily.
    ///
    /// Both base pointers resolve up front, so a missing capability aborts
    /// here with zero elements emitted. The returned iterator is finite, can
    /// be abandoned between steps, and a fresh call re-walks from scratch.
    pub fn traverse<'a>(
        &'a self,
        table: &'a TableHandle,
        decoder: &'a dyn ElementDecoder,
    ) -> Result<Traversal<'a, A>> {
        if table.element_size == 0 {
            return Err(InspectError::InvalidArgument(
                "element size must be non-zero".into(),
            ));
        }
        let groups_base = resolve_address(&self.registry, &table.groups, self.options.max_resolve_depth)?;
        let elements_base =
            resolve_address(&self.registry, &table.elements, self.options.max_resolve_depth)?;
        let origin = self.initial_handle(table, elements_base)?;
        debug!(
            groups = table.group_count,
            element_size = table.element_size,
            vectorized = table.descriptor.vectorized,
            "starting traversal"
        );
        Ok(Traversal {
            accessor: &self.accessor,
            table,
            decoder,
            cursor: TraversalCursor::new(table.group_count),
            formatter: Formatter::new(table.descriptor.role),
            groups_base,
            elements_base,
            origin,
            emitted: 0,
            element_limit: self.options.element_limit,
            done: false,
        })
    }

    /// Reads and derives the stats for one metric of `table`.
    pub fn stats(&self, table: &TableHandle, metric: MetricKind) -> Result<DerivedStats> {
        let base = table.stats.ok_or_else(|| {
            InspectError::InvalidArgument("table handle carries no stats block".into())
        })?;
        let sample = StatsSample::read(&self.accessor, base, metric)?;
        Ok(derive(&sample))
    }

    /// Rebuilds the table's own representation of its element pointer, for
    /// display parity. Traversal itself never touches this value.
    fn initial_handle(&self, table: &TableHandle, elements_base: u64) -> Result<PointerHandle> {
        match (&table.elements, table.descriptor.pointer_kind) {
            (PointerHandle::Opaque(opaque), _) => {
                let capability = self.registry.lookup(&opaque.type_key).ok_or_else(|| {
                    InspectError::UnsupportedPointerKind(opaque.type_key.as_str().to_owned())
                })?;
                capability.construct_initial(elements_base)
            }
            (PointerHandle::Raw(_), PointerKind::Raw) => {
                RawCapability.construct_initial(elements_base)
            }
            (PointerHandle::Raw(_), PointerKind::Opaque) => {
                // Caller already normalized the handle; echo the address.
                RawCapability.construct_initial(elements_base)
            }
        }
    }
}

/// A lazy, finite walk of one table's live elements.
pub struct Traversal<'a, A: MemoryAccessor> {
    accessor: &'a A,
    table: &'a TableHandle,
    decoder: &'a dyn ElementDecoder,
    cursor: TraversalCursor,
    formatter: Formatter,
    groups_base: u64,
    elements_base: u64,
    origin: PointerHandle,
    emitted: usize,
    element_limit: Option<usize>,
    done: bool,
}

impl<'a, A: MemoryAccessor> Traversal<'a, A> {
    /// The table's own representation of its element pointer.
    pub fn origin(&self) -> &PointerHandle {
        &self.origin
    }

    /// Records produced so far, placeholders included.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn truncate(&mut self, error: &InspectError) -> DisplayRecord {
        warn!(%error, emitted = self.emitted, "traversal truncated");
        self.done = true;
        self.cursor.finish();
        self.emitted += 1;
        Formatter::truncation(error)
    }
}

impl<'a, A: MemoryAccessor> Iterator for Traversal<'a, A> {
    type Item = DisplayRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.cursor.step() {
                Step::Exhausted => {
                    self.done = true;
                    return None;
                }
                Step::NeedGroup(index) => {
                    let record =
                        match GroupRecord::read(self.accessor, self.groups_base, index) {
                            Ok(record) => record,
                            Err(error) => return Some(self.truncate(&error)),
                        };
                    match record.classify(&self.table.descriptor) {
                        GroupClass::Live(mask) => self.cursor.load_group(mask),
                        GroupClass::Sentinel => {
                            debug!(group = index, "sentinel group, ending traversal");
                            self.cursor.finish();
                        }
                        GroupClass::Malformed => {
                            let error = InspectError::MalformedLayout(format!(
                                "group {index} mixes sentinel and live slots"
                            ));
                            return Some(self.truncate(&error));
                        }
                    }
                }
                Step::Emit { group, slot } => {
                    if let Some(limit) = self.element_limit {
                        if self.emitted >= limit {
                            let error = InspectError::InvalidArgument(format!(
                                "output capped at {limit} records"
                            ));
                            return Some(self.truncate(&error));
                        }
                    }
                    let index = TraversalCursor::global_slot(group, slot);
                    let addr =
                        advance_address(self.elements_base, self.table.element_size, index);
                    let raw = match self
                        .accessor
                        .read_vec(addr, self.table.element_size as usize)
                    {
                        Ok(raw) => raw,
                        Err(error) => return Some(self.truncate(&error)),
                    };
                    self.emitted += 1;
                    return Some(match self.decoder.decode(&raw, self.table.descriptor.role) {
                        Ok(decoded) => self.formatter.format(decoded),
                        Err(error) => self.formatter.undecodable(&raw, &error),
                    });
                }
            }
        }
    }
}
