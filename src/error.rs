use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, InspectError>;

/// Failures surfaced by the introspection engine.
///
/// `InaccessibleMemory` and `MalformedLayout` are request-level: the current
/// traversal or stats call stops, partial output already produced stays
/// valid, and the hosting session is never torn down. `UnsupportedPointerKind`
/// aborts before any element is emitted, since no element address can be
/// trusted without a resolved pointer capability.
#[derive(Debug, Error)]
pub enum InspectError {
    /// A read against target memory failed (unmapped or protected range).
    #[error("inaccessible memory: {len} bytes at {addr:#x}")]
    InaccessibleMemory {
        /// Address of the failed read.
        addr: u64,
        /// Requested length in bytes.
        len: usize,
    },
    /// The handle's type has no registered pointer capability.
    #[error("unsupported pointer representation: {0}")]
    UnsupportedPointerKind(String),
    /// The descriptor claims a layout the actual bytes contradict.
    /// Detected opportunistically, never exhaustively verified.
    #[error("malformed layout: {0}")]
    MalformedLayout(String),
    /// Engine misuse from the caller's side.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl InspectError {
    /// True for errors that downgrade to truncated partial output instead of
    /// aborting a traversal outright.
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            InspectError::InaccessibleMemory { .. } | InspectError::MalformedLayout(_)
        )
    }
}
