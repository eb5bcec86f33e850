//! Synthetic table images for tests, benches, and demos.
//!
//! Builds a byte-accurate table image inside a [`MemoryImage`] together with
//! the [`TableHandle`] describing it, so the engine can be exercised without
//! a live target process.

use smallvec::SmallVec;

use crate::engine::TableHandle;
use crate::error::{InspectError, Result};
use crate::group::{occupied_byte, sentinel_byte};
use crate::layout::{LayoutDescriptor, GROUP_CAPACITY, GROUP_METADATA_LEN};
use crate::memory::MemoryImage;
use crate::pointer::{
    OpaqueHandle, PointerCapability, PointerHandle, Resolution, TypeKey,
};
use crate::stats::{StatsSample, STATS_SAMPLE_LEN};

/// Default base address for fixture images.
pub const DEFAULT_BASE: u64 = 0x0010_0000;

/// Test capability: handle bytes are the address XOR a fixed mask.
///
/// Small enough to reason about in assertions while still being observably
/// different from a raw-address interpretation.
#[derive(Debug)]
pub struct XorMaskedPointers {
    type_key: TypeKey,
    mask: u64,
}

impl XorMaskedPointers {
    /// A capability for `type_key` with the given mask.
    pub fn new(type_key: TypeKey, mask: u64) -> Self {
        Self { type_key, mask }
    }

    /// Encodes `addr` the way handles of this type store it.
    pub fn encode(&self, addr: u64) -> OpaqueHandle {
        OpaqueHandle::new(self.type_key.clone(), &(addr ^ self.mask).to_le_bytes())
    }
}

impl PointerCapability for XorMaskedPointers {
    fn resolve(&self, handle: &OpaqueHandle) -> Result<Resolution> {
        let raw: [u8; 8] = handle.bytes.as_slice().try_into().map_err(|_| {
            InspectError::MalformedLayout(format!(
                "{} handle must be 8 bytes, have {}",
                self.type_key,
                handle.bytes.len()
            ))
        })?;
        Ok(Resolution::Address(u64::from_le_bytes(raw) ^ self.mask))
    }

    fn construct_initial(&self, addr: u64) -> Result<PointerHandle> {
        Ok(PointerHandle::Opaque(self.encode(addr)))
    }
}

/// Builds one synthetic table image.
#[derive(Debug)]
pub struct TableImageBuilder {
    descriptor: LayoutDescriptor,
    element_size: u64,
    base: u64,
    slots: Vec<Option<Vec<u8>>>,
    forced_group_count: Option<u64>,
    sentinel_trailer: bool,
    stats: Option<[StatsSample; 3]>,
    opaque: Option<(TypeKey, u64)>,
}

impl TableImageBuilder {
    /// A builder for a table with the given descriptor and element size.
    pub fn new(descriptor: LayoutDescriptor, element_size: u64) -> Self {
        Self {
            descriptor,
            element_size,
            base: DEFAULT_BASE,
            slots: Vec::new(),
            forced_group_count: None,
            sentinel_trailer: false,
            stats: None,
            opaque: None,
        }
    }

    /// Maps the image at `base` instead of [`DEFAULT_BASE`].
    pub fn base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Appends an element in the next unoccupied slot.
    pub fn push(mut self, element: Vec<u8>) -> Self {
        assert_eq!(
            element.len() as u64,
            self.element_size,
            "element bytes must match the declared element size"
        );
        self.slots.push(Some(element));
        self
    }

    /// Appends a single-u64 element.
    pub fn push_u64(self, value: u64) -> Self {
        self.push(value.to_le_bytes().to_vec())
    }

    /// Appends a `(u64, u64)` pair element.
    pub fn push_pair(self, key: u64, value: u64) -> Self {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&key.to_le_bytes());
        bytes.extend_from_slice(&value.to_le_bytes());
        self.push(bytes)
    }

    /// Places an element at an explicit global slot, leaving gaps empty.
    pub fn place(mut self, global_slot: usize, element: Vec<u8>) -> Self {
        assert_eq!(element.len() as u64, self.element_size);
        if self.slots.len() <= global_slot {
            self.slots.resize(global_slot + 1, None);
        }
        self.slots[global_slot] = Some(element);
        self
    }

    /// Forces the group count instead of deriving it from the highest slot.
    pub fn group_count(mut self, count: u64) -> Self {
        self.forced_group_count = Some(count);
        self
    }

    /// Appends a fully-sentinel group after the last data group.
    pub fn sentinel_trailer(mut self) -> Self {
        self.sentinel_trailer = true;
        self
    }

    /// Attaches a stats block with the three metric samples in block order.
    pub fn stats(mut self, samples: [StatsSample; 3]) -> Self {
        self.stats = Some(samples);
        self
    }

    /// Routes the table's pointers through XOR-masked opaque handles of the
    /// given type. Pair with a registered [`XorMaskedPointers`] capability,
    /// or leave it unregistered to exercise the unsupported outcome.
    pub fn opaque(mut self, type_key: TypeKey, mask: u64) -> Self {
        self.descriptor = self.descriptor.opaque();
        self.opaque = Some((type_key, mask));
        self
    }

    /// Lays out the image and returns it with its table handle.
    pub fn build(self) -> (MemoryImage, TableHandle) {
        let data_groups = self
            .forced_group_count
            .unwrap_or_else(|| self.slots.len().div_ceil(GROUP_CAPACITY) as u64);
        let group_count = data_groups + u64::from(self.sentinel_trailer);

        let groups_addr = self.base;
        let elements_addr = groups_addr + group_count * GROUP_METADATA_LEN as u64;
        let elements_len = data_groups * GROUP_CAPACITY as u64 * self.element_size;
        let stats_addr = elements_addr + elements_len;

        let mut image = MemoryImage::new(self.base, Vec::new());

        for group in 0..data_groups {
            let mut block = [0u8; GROUP_METADATA_LEN];
            for slot in 0..GROUP_CAPACITY {
                let global = group as usize * GROUP_CAPACITY + slot;
                if self.slots.get(global).is_some_and(Option::is_some) {
                    block[slot] = occupied_byte(global as u8);
                }
            }
            image.put(groups_addr + group * GROUP_METADATA_LEN as u64, &block);
        }
        if self.sentinel_trailer {
            let mut block = [sentinel_byte(&self.descriptor); GROUP_METADATA_LEN];
            block[GROUP_CAPACITY] = 0;
            image.put(groups_addr + data_groups * GROUP_METADATA_LEN as u64, &block);
        }

        // Zero the whole element region first so empty slots read cleanly.
        if elements_len > 0 {
            image.put(elements_addr + elements_len - 1, &[0]);
        }
        for (global, element) in self.slots.iter().enumerate() {
            if let Some(bytes) = element {
                image.put(elements_addr + global as u64 * self.element_size, bytes);
            }
        }

        let stats = self.stats.map(|samples| {
            let mut block = [0u8; 3 * STATS_SAMPLE_LEN];
            for (i, sample) in samples.iter().enumerate() {
                block[i * STATS_SAMPLE_LEN..(i + 1) * STATS_SAMPLE_LEN]
                    .copy_from_slice(&sample.to_bytes());
            }
            image.put(stats_addr, &block);
            stats_addr
        });

        let (groups, elements) = match &self.opaque {
            Some((type_key, mask)) => (
                wrap_handle(type_key, *mask, groups_addr),
                wrap_handle(type_key, *mask, elements_addr),
            ),
            None => (
                PointerHandle::Raw(groups_addr),
                PointerHandle::Raw(elements_addr),
            ),
        };

        let handle = TableHandle {
            descriptor: self.descriptor,
            groups,
            elements,
            group_count,
            element_size: self.element_size,
            stats,
        };
        (image, handle)
    }
}

fn wrap_handle(type_key: &TypeKey, mask: u64, addr: u64) -> PointerHandle {
    let bytes: SmallVec<[u8; 16]> = SmallVec::from_slice(&(addr ^ mask).to_le_bytes());
    PointerHandle::Opaque(OpaqueHandle {
        type_key: type_key.clone(),
        bytes,
    })
}
