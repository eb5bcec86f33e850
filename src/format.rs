//! Turning decoded elements into display records.
//!
//! Keying follows the standard map/set display convention: a map record is
//! keyed by the key's own display text, a set record by a running zero-based
//! index. The numbering carries no invariant beyond consistency within one
//! traversal.

use std::fmt;

use serde::Serialize;

use crate::error::{InspectError, Result};
use crate::layout::Role;
use crate::memory::get_u64_le;

/// How a record is keyed in the display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKey {
    /// The element key's display text (map role).
    Text(String),
    /// A running zero-based position (set role).
    Index(u64),
}

/// One entry of the logical view handed to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayRecord {
    /// A live element.
    Element {
        /// Display key per the table's role.
        key: DisplayKey,
        /// The element's (or mapped value's) display text.
        value: String,
    },
    /// A clearly labeled stand-in for output the engine could not produce:
    /// either one undecodable element, or a truncation notice ending the
    /// stream. Never a raised fault.
    Placeholder {
        /// Human-readable reason.
        reason: String,
    },
}

impl fmt::Display for DisplayRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayRecord::Element { key, value } => match key {
                DisplayKey::Text(k) => write!(f, "[{k}] = {value}"),
                DisplayKey::Index(i) => write!(f, "[{i}] = {value}"),
            },
            DisplayRecord::Placeholder { reason } => write!(f, "<{reason}>"),
        }
    }
}

/// A decoded element, before display keying is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedElement {
    /// Display text of the element's key; required for the map role.
    pub key: Option<String>,
    /// Display text of the element (set) or mapped value (map).
    pub value: String,
}

/// Decodes one element's raw bytes into display text.
///
/// Registered per table by the host; the engine ships decoders for the
/// fixed-width integer layouts its fixtures use.
pub trait ElementDecoder {
    /// Decodes the `element_size` bytes of one element.
    fn decode(&self, raw: &[u8], role: Role) -> Result<DecodedElement>;
}

/// Decoder for elements that are a single little-endian u64.
#[derive(Debug, Default)]
pub struct U64Decoder;

impl ElementDecoder for U64Decoder {
    fn decode(&self, raw: &[u8], _role: Role) -> Result<DecodedElement> {
        if raw.len() < 8 {
            return Err(InspectError::MalformedLayout(format!(
                "u64 element needs 8 bytes, have {}",
                raw.len()
            )));
        }
        Ok(DecodedElement {
            key: None,
            value: get_u64_le(raw, 0).to_string(),
        })
    }
}

/// Decoder for elements that are a `(u64 key, u64 value)` pair.
#[derive(Debug, Default)]
pub struct U64PairDecoder;

impl ElementDecoder for U64PairDecoder {
    fn decode(&self, raw: &[u8], _role: Role) -> Result<DecodedElement> {
        if raw.len() < 16 {
            return Err(InspectError::MalformedLayout(format!(
                "u64 pair element needs 16 bytes, have {}",
                raw.len()
            )));
        }
        Ok(DecodedElement {
            key: Some(get_u64_le(raw, 0).to_string()),
            value: get_u64_le(raw, 8).to_string(),
        })
    }
}

/// Applies the display keying convention across one traversal.
#[derive(Debug)]
pub struct Formatter {
    role: Role,
    next_index: u64,
}

impl Formatter {
    /// A formatter for one traversal of a table with the given role.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            next_index: 0,
        }
    }

    /// Produces the display record for one decoded element.
    pub fn format(&mut self, decoded: DecodedElement) -> DisplayRecord {
        let index = self.bump_index();
        match self.role {
            Role::Map => match decoded.key {
                Some(key) => DisplayRecord::Element {
                    key: DisplayKey::Text(key),
                    value: decoded.value,
                },
                None => DisplayRecord::Placeholder {
                    reason: format!("element {index}: decoder produced no key for map role"),
                },
            },
            Role::Set => DisplayRecord::Element {
                key: DisplayKey::Index(index),
                value: decoded.value,
            },
        }
    }

    /// Placeholder standing in for one element the decoder rejected; keeps
    /// the set-role numbering consistent with the elements it replaces.
    pub fn undecodable(&mut self, raw: &[u8], error: &InspectError) -> DisplayRecord {
        let index = self.bump_index();
        DisplayRecord::Placeholder {
            reason: format!("element {index} undecodable ({error}): 0x{}", hex::encode(raw)),
        }
    }

    /// Truncation notice ending a partial traversal.
    pub fn truncation(error: &InspectError) -> DisplayRecord {
        DisplayRecord::Placeholder {
            reason: format!("traversal truncated: {error}"),
        }
    }

    fn bump_index(&mut self) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}
