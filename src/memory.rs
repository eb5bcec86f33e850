//! Read-only typed access to the inspected process's memory.

use std::convert::TryInto;

use crate::error::{InspectError, Result};

/// Typed, read-only view of target memory, supplied by the inspecting host.
///
/// The engine never writes through this interface and never assumes two
/// reads of the same range agree; a concurrently mutated table yields
/// best-effort output, not a snapshot.
pub trait MemoryAccessor {
    /// Fills `buf` with the bytes at `addr`, failing with
    /// [`InspectError::InaccessibleMemory`] when any part of the range is
    /// unmapped or protected.
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    /// Reads a single byte.
    fn read_u8(&self, addr: u64) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(addr, &mut buf)?;
        Ok(buf[0])
    }

    /// Reads a little-endian u64.
    fn read_u64(&self, addr: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a little-endian f64.
    fn read_f64(&self, addr: u64) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    /// Reads `len` bytes into an owned vector.
    fn read_vec(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(addr, &mut buf)?;
        Ok(buf)
    }
}

/// A slice of target memory mapped at a base address.
///
/// Stands in for a live target in tests, fixtures, and the dump-file CLI
/// path; reads outside the mapped range fail exactly like a live target's
/// unmapped pages.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    base: u64,
    bytes: Vec<u8>,
}

impl MemoryImage {
    /// Maps `bytes` at `base`.
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    /// Base address of the mapped range.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Length of the mapped range in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when no bytes are mapped.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The mapped bytes, e.g. for writing a dump file.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrites a range of the image, growing it if needed. Fixture-side
    /// mutation only; the engine itself never writes.
    pub fn put(&mut self, addr: u64, data: &[u8]) {
        let off = (addr - self.base) as usize;
        let end = off + data.len();
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[off..end].copy_from_slice(data);
    }
}

impl MemoryAccessor for MemoryImage {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let fail = || InspectError::InaccessibleMemory {
            addr,
            len: buf.len(),
        };
        let off = addr.checked_sub(self.base).ok_or_else(fail)? as usize;
        let end = off.checked_add(buf.len()).ok_or_else(fail)?;
        let src = self.bytes.get(off..end).ok_or_else(fail)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// Reads a little-endian u64 out of a byte slice at `off`.
///
/// Panics if the slice is too short; callers size their reads from layout
/// constants, not from target data.
pub fn get_u64_le(src: &[u8], off: usize) -> u64 {
    let bytes: [u8; 8] = src[off..off + 8]
        .try_into()
        .expect("slice is exactly 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Reads a little-endian f64 out of a byte slice at `off`.
pub fn get_f64_le(src: &[u8], off: usize) -> f64 {
    f64::from_bits(get_u64_le(src, off))
}
