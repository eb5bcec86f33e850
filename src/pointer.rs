//! The pointer-representation protocol.
//!
//! Tables reach their group and element arrays either through native
//! addresses or through author-defined opaque handle types. The engine never
//! executes the handle type's own code; an author instead registers a
//! [`PointerCapability`] for the handle's runtime type, and the engine
//! resolves every handle to a concrete address once, up front. All stepping
//! after that point is plain address arithmetic, so no opaque value is ever
//! carried as traversal state.
//!
//! Resolution runs as a closed alternative selection: the raw alternative
//! applies exactly when the handle already is a concrete address, and the
//! registry alternative covers everything else. A missing registration is a
//! first-class outcome ([`InspectError::UnsupportedPointerKind`]), never a
//! fall-back to a raw-address guess.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{InspectError, Result};

/// Runtime type identity under which a capability registers: the handle
/// type's name as the inspecting host reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeKey(String);

/// Canonical type name of the native address representation.
const RAW_ADDRESS_TYPE: &str = "address";

impl TypeKey {
    /// Builds a key from a host-reported type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The key denoting native machine addresses.
    pub fn raw_address() -> Self {
        Self(RAW_ADDRESS_TYPE.to_owned())
    }

    /// The type name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A non-address pointer value: a read-only byte view of the table's own
/// handle representation, tagged with its runtime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueHandle {
    /// Runtime type of the handle, the registry lookup key.
    pub type_key: TypeKey,
    /// The handle's raw bytes, implementation-defined size.
    pub bytes: SmallVec<[u8; 16]>,
}

impl OpaqueHandle {
    /// Wraps handle bytes under a type key.
    pub fn new(type_key: TypeKey, bytes: &[u8]) -> Self {
        Self {
            type_key,
            bytes: SmallVec::from_slice(bytes),
        }
    }
}

/// Either a concrete address or an opaque handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerHandle {
    /// A native machine address.
    Raw(u64),
    /// An opaque handle requiring capability resolution.
    Opaque(OpaqueHandle),
}

/// Result of peeling one opaque layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A concrete address was reached; resolution terminates here.
    Address(u64),
    /// Another pointer layer; resolution continues on this handle.
    Handle(PointerHandle),
}

/// Author-supplied implementation of the pointer protocol for one opaque
/// handle type.
///
/// `resolve` reduces one layer; `advance` is pure address arithmetic on an
/// already-concrete address and never reconstructs a handle;
/// `construct_initial` rebuilds the table's own representation of an address
/// once per request, for display parity only.
pub trait PointerCapability: Send + Sync {
    /// Peels one opaque layer off `handle`.
    fn resolve(&self, handle: &OpaqueHandle) -> Result<Resolution>;

    /// Address of the element `count` positions after `addr`. Wrapping
    /// arithmetic: corrupt sizes produce wrong addresses, not panics.
    fn advance(&self, addr: u64, element_size: u64, count: u64) -> u64 {
        addr.wrapping_add(element_size.wrapping_mul(count))
    }

    /// Rebuilds the handle equivalent of a concrete address.
    fn construct_initial(&self, addr: u64) -> Result<PointerHandle>;
}

/// The trivial capability for native addresses.
///
/// Its `resolve` applies only to handles that already are addresses, so it
/// rejects every opaque handle it is handed; [`resolve_address`] relies on
/// exactly one alternative applying to any given handle.
#[derive(Debug, Default)]
pub struct RawCapability;

impl PointerCapability for RawCapability {
    fn resolve(&self, handle: &OpaqueHandle) -> Result<Resolution> {
        Err(InspectError::InvalidArgument(format!(
            "raw capability cannot resolve opaque handle of type {}",
            handle.type_key
        )))
    }

    fn construct_initial(&self, addr: u64) -> Result<PointerHandle> {
        Ok(PointerHandle::Raw(addr))
    }
}

/// What the registry knows about a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKindReport {
    /// The native address type.
    Raw,
    /// An opaque type with a registered capability.
    Opaque,
    /// An opaque type nothing is registered for.
    Unsupported,
}

/// Type-keyed table of pointer capabilities, populated at startup.
///
/// Absence is first-class: traversing a table whose handles have no
/// registered capability reports `UnsupportedPointerKind` with zero output.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<TypeKey, Arc<dyn PointerCapability>>>,
}

impl CapabilityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `capability` for `type_key`, replacing any previous entry.
    pub fn register(&self, type_key: TypeKey, capability: Arc<dyn PointerCapability>) {
        debug!(ty = %type_key, "registering pointer capability");
        self.entries.write().insert(type_key, capability);
    }

    /// Looks up the capability registered for `type_key`.
    pub fn lookup(&self, type_key: &TypeKey) -> Option<Arc<dyn PointerCapability>> {
        self.entries.read().get(type_key).cloned()
    }

    /// Reports how handles of `type_key` can be interpreted.
    pub fn describe(&self, type_key: &TypeKey) -> PointerKindReport {
        if type_key.as_str() == RAW_ADDRESS_TYPE {
            PointerKindReport::Raw
        } else if self.entries.read().contains_key(type_key) {
            PointerKindReport::Opaque
        } else {
            PointerKindReport::Unsupported
        }
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .entries
            .read()
            .keys()
            .map(|k| k.as_str().to_owned())
            .collect();
        f.debug_struct("CapabilityRegistry")
            .field("types", &keys)
            .finish()
    }
}

/// Reduces `handle` to a concrete address.
///
/// The raw alternative applies when the handle already is an address; the
/// registry alternative recurses through intermediate opaque layers,
/// terminating the first time a concrete address is reached. `max_depth`
/// bounds the layer count so cyclic capability definitions cannot hang a
/// traversal.
pub fn resolve_address(
    registry: &CapabilityRegistry,
    handle: &PointerHandle,
    max_depth: usize,
) -> Result<u64> {
    let mut current = handle.clone();
    for _ in 0..=max_depth {
        let opaque = match current {
            PointerHandle::Raw(addr) => return Ok(addr),
            PointerHandle::Opaque(opaque) => opaque,
        };
        let capability = registry.lookup(&opaque.type_key).ok_or_else(|| {
            InspectError::UnsupportedPointerKind(opaque.type_key.as_str().to_owned())
        })?;
        match capability.resolve(&opaque)? {
            Resolution::Address(addr) => return Ok(addr),
            Resolution::Handle(next) => current = next,
        }
    }
    Err(InspectError::MalformedLayout(format!(
        "opaque handle did not resolve within {max_depth} layers"
    )))
}

/// Address of the element `count` positions after `addr`, without any
/// registered capability in play. Identical arithmetic to the trait default.
pub fn advance_address(addr: u64, element_size: u64, count: u64) -> u64 {
    addr.wrapping_add(element_size.wrapping_mul(count))
}
