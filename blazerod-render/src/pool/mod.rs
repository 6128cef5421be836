//! GPU shader data pool
//!
//! A rotating ring of buffer arenas that hands out GPU-visible slices for
//! per-frame shader data (local matrices, joints, morph weights, transformed
//! vertices). Each ring slot owns its backing buffers; a slice stays valid
//! until the ring wraps back to the slot it was allocated from, so one frame
//! can be written while the previous frames are still read by the GPU.
//!
//! # Layout
//! ```text
//! slot 0 [current: 64K | retired: 32K]   <- allocating
//! slot 1 [current: 64K]                  <- in flight
//! slot 2 [current: 128K]                 <- in flight
//! ```
//! - Slicing pools bump-allocate aligned ranges out of the slot's current
//!   buffer and grow geometrically; outgrown buffers are retired in the same
//!   slot and dropped when the ring wraps.
//! - Non-slicing pools hand out one whole buffer per allocation and recycle
//!   them through the slot's free list.

mod gpu;
mod memory;

#[cfg(test)]
mod tests;

use std::thread::ThreadId;

use hashbrown::HashMap;
use thiserror::Error;

pub use gpu::{WgpuBackend, buffer_usages};
pub use memory::{MemoryBackend, MemoryBuffer};

/// Initial buffer size (64KB)
pub const INITIAL_BUFFER_SIZE: u64 = 64 * 1024;

/// Growth factor when a slot's buffer needs to expand (2x)
const BUFFER_GROWTH_FACTOR: u64 = 2;

/// Double buffering is the least that keeps the GPU from reading a slot being written
pub const MIN_RING_DEPTH: usize = 2;

pub const DEFAULT_RING_DEPTH: usize = 3;

/// How the shader reads a pool's buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backing {
    /// Shader storage buffer
    Storage,
    /// Texture buffer object, for devices without storage buffers
    Texel,
    Uniform,
    Vertex,
    /// Vertex buffer written by a compute shader
    VertexStorage,
}

/// Buffer creation and upload for one graphics API
pub trait ShaderDataBackend {
    type Buffer;

    fn create_buffer(&mut self, label: &str, backing: Backing, size: u64) -> Self::Buffer;

    fn write(&mut self, buffer: &mut Self::Buffer, offset: u64, bytes: &[u8]);

    /// Largest buffer a pool of `backing` may create
    ///
    /// Texel and uniform pools are bound as uniform blocks, so their cap is
    /// the uniform binding limit rather than the buffer size limit.
    fn max_buffer_size(&self, backing: Backing) -> u64;

    /// Offset alignment the API requires for any write
    fn min_alignment(&self) -> u64 {
        1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDescriptor {
    pub label: String,
    pub backing: Backing,
    /// Offset alignment of every slice (0 and 1 mean unaligned)
    pub alignment: u64,
    pub ring_depth: usize,
    pub supports_slicing: bool,
    pub initial_capacity: u64,
}

impl PoolDescriptor {
    pub fn new(label: impl Into<String>, backing: Backing, alignment: u64) -> Self {
        Self {
            label: label.into(),
            backing,
            alignment,
            ring_depth: DEFAULT_RING_DEPTH,
            supports_slicing: true,
            initial_capacity: INITIAL_BUFFER_SIZE,
        }
    }

    pub fn storage(label: impl Into<String>, alignment: u64) -> Self {
        Self::new(label, Backing::Storage, alignment)
    }

    pub fn texel(label: impl Into<String>, alignment: u64) -> Self {
        Self::new(label, Backing::Texel, alignment)
    }

    pub fn uniform(label: impl Into<String>, alignment: u64) -> Self {
        Self::new(label, Backing::Uniform, alignment)
    }

    /// Whole-buffer vertex pool
    pub fn vertex(label: impl Into<String>, backing: Backing) -> Self {
        Self {
            supports_slicing: false,
            ..Self::new(label, backing, 0)
        }
    }

    pub fn with_ring_depth(mut self, ring_depth: usize) -> Self {
        self.ring_depth = ring_depth;
        self
    }

    pub fn with_initial_capacity(mut self, initial_capacity: u64) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }
}

/// Pool-local buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// A range of a pooled buffer, valid until its ring slot comes around again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderDataSlice {
    /// `None` for zero-sized allocations
    pub buffer: Option<BufferId>,
    pub offset: u64,
    pub size: u64,
}

impl ShaderDataSlice {
    pub const EMPTY: Self = Self {
        buffer: None,
        offset: 0,
        size: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn overlaps(&self, other: &ShaderDataSlice) -> bool {
        self.buffer.is_some()
            && self.buffer == other.buffer
            && self.offset < other.end()
            && other.offset < self.end()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Ring depth must be at least {MIN_RING_DEPTH}, got {0}")]
    RingDepth(usize),

    #[error("Pool '{0}' is closed")]
    Closed(String),

    #[error("Allocation of {size} bytes exceeds the maximum buffer size of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("Item {index} is {found} bytes, expected {expected}")]
    MismatchedItems {
        index: usize,
        expected: usize,
        found: usize,
    },
}

struct PooledBuffer<T> {
    buffer: T,
    capacity: u64,
}

#[derive(Debug, Default)]
struct RingSlot {
    /// Bump target of a slicing pool
    current: Option<BufferId>,
    cursor: u64,
    /// Outgrown buffers, dropped when the ring wraps back here
    retired: Vec<BufferId>,
    /// Whole buffers handed out since this slot became current
    in_use: Vec<BufferId>,
    free: Vec<BufferId>,
}

impl RingSlot {
    fn buffers(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.current
            .iter()
            .chain(&self.retired)
            .chain(&self.in_use)
            .chain(&self.free)
            .copied()
    }
}

pub struct ShaderDataPool<B: ShaderDataBackend> {
    backend: B,
    descriptor: PoolDescriptor,
    alignment: u64,
    buffers: HashMap<BufferId, PooledBuffer<B::Buffer>>,
    slots: Vec<RingSlot>,
    slot: usize,
    next_id: u32,
    closed: bool,
    owner: ThreadId,
}

impl<B: ShaderDataBackend> ShaderDataPool<B> {
    pub fn new(backend: B, descriptor: PoolDescriptor) -> Result<Self, PoolError> {
        if descriptor.ring_depth < MIN_RING_DEPTH {
            return Err(PoolError::RingDepth(descriptor.ring_depth));
        }
        let alignment = descriptor.alignment.max(backend.min_alignment()).max(1);
        let slots = (0..descriptor.ring_depth).map(|_| RingSlot::default()).collect();

        tracing::debug!(
            "Created shader data pool '{}': {:?}, alignment {}, ring depth {}, slicing {}",
            descriptor.label,
            descriptor.backing,
            alignment,
            descriptor.ring_depth,
            descriptor.supports_slicing
        );

        Ok(Self {
            backend,
            descriptor,
            alignment,
            buffers: HashMap::new(),
            slots,
            slot: 0,
            next_id: 0,
            closed: false,
            owner: std::thread::current().id(),
        })
    }

    pub fn label(&self) -> &str {
        &self.descriptor.label
    }

    pub fn descriptor(&self) -> &PoolDescriptor {
        &self.descriptor
    }

    pub fn backing(&self) -> Backing {
        self.descriptor.backing
    }

    /// Effective slice alignment (descriptor and backend requirements combined)
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn ring_depth(&self) -> usize {
        self.slots.len()
    }

    /// Index of the ring slot new allocations come from
    pub fn current_slot(&self) -> usize {
        self.slot
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn buffer(&self, id: BufferId) -> Option<&B::Buffer> {
        self.buffers.get(&id).map(|entry| &entry.buffer)
    }

    /// Number of live backing buffers across all slots
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Total bytes held by one ring slot
    pub fn slot_capacity(&self, slot: usize) -> u64 {
        self.slots.get(slot).map_or(0, |slot| {
            slot.buffers()
                .filter_map(|id| self.buffers.get(&id))
                .map(|entry| entry.capacity)
                .sum()
        })
    }

    fn assert_owner(&self) {
        debug_assert_eq!(
            std::thread::current().id(),
            self.owner,
            "Shader data pool '{}' used from a thread other than its owner",
            self.descriptor.label
        );
    }

    fn check_open(&self) -> Result<(), PoolError> {
        if self.closed {
            return Err(PoolError::Closed(self.descriptor.label.clone()));
        }
        Ok(())
    }

    fn create_buffer(&mut self, capacity: u64) -> BufferId {
        let id = BufferId(self.next_id);
        self.next_id += 1;
        let label = format!("{} #{}", self.descriptor.label, id.0);
        let buffer = self
            .backend
            .create_buffer(&label, self.descriptor.backing, capacity);
        self.buffers.insert(id, PooledBuffer { buffer, capacity });
        id
    }

    /// Reserve `size` bytes in the current ring slot
    pub fn allocate(&mut self, size: u64) -> Result<ShaderDataSlice, PoolError> {
        self.assert_owner();
        self.check_open()?;
        if size == 0 {
            return Ok(ShaderDataSlice::EMPTY);
        }
        let max = self.backend.max_buffer_size(self.descriptor.backing);
        if size > max {
            return Err(PoolError::TooLarge { size, max });
        }

        if self.descriptor.supports_slicing {
            Ok(self.allocate_slice(size, max))
        } else {
            Ok(self.allocate_whole(size, max))
        }
    }

    fn allocate_slice(&mut self, size: u64, max: u64) -> ShaderDataSlice {
        let slot = &self.slots[self.slot];
        let current = slot.current.map(|id| (id, self.buffers[&id].capacity));

        if let Some((id, capacity)) = current {
            let offset = slot.cursor.next_multiple_of(self.alignment);
            if offset + size <= capacity {
                self.slots[self.slot].cursor = offset + size;
                return ShaderDataSlice {
                    buffer: Some(id),
                    offset,
                    size,
                };
            }
        }

        // Calculate new capacity (at least double, or enough for the request)
        let mut new_capacity = match current {
            Some((_, capacity)) => capacity * BUFFER_GROWTH_FACTOR,
            None => self.descriptor.initial_capacity.max(1),
        };
        while new_capacity < size {
            new_capacity *= BUFFER_GROWTH_FACTOR;
        }
        let new_capacity = new_capacity.min(max);

        tracing::debug!(
            "Growing buffer '{}' slot {}: {} -> {} bytes",
            self.descriptor.label,
            self.slot,
            current.map_or(0, |(_, capacity)| capacity),
            new_capacity
        );

        let id = self.create_buffer(new_capacity);
        let slot = &mut self.slots[self.slot];
        if let Some(old) = slot.current.replace(id) {
            slot.retired.push(old);
        }
        slot.cursor = size;
        ShaderDataSlice {
            buffer: Some(id),
            offset: 0,
            size,
        }
    }

    fn allocate_whole(&mut self, size: u64, max: u64) -> ShaderDataSlice {
        let slot = &self.slots[self.slot];
        let best_fit = slot
            .free
            .iter()
            .enumerate()
            .filter(|(_, id)| self.buffers[*id].capacity >= size)
            .min_by_key(|(_, id)| self.buffers[*id].capacity)
            .map(|(index, _)| index);

        let id = match best_fit {
            Some(index) => self.slots[self.slot].free.swap_remove(index),
            None => {
                let capacity = size.next_power_of_two().min(max);
                tracing::debug!(
                    "Creating buffer '{}' slot {}: {} bytes",
                    self.descriptor.label,
                    self.slot,
                    capacity
                );
                self.create_buffer(capacity)
            }
        };
        self.slots[self.slot].in_use.push(id);
        ShaderDataSlice {
            buffer: Some(id),
            offset: 0,
            size,
        }
    }

    fn write(&mut self, slice: &ShaderDataSlice, offset: u64, bytes: &[u8]) {
        let Some(id) = slice.buffer else {
            return;
        };
        if let Some(entry) = self.buffers.get_mut(&id) {
            self.backend
                .write(&mut entry.buffer, slice.offset + offset, bytes);
        }
    }

    /// Allocate and fill a slice with `bytes`
    pub fn upload(&mut self, bytes: &[u8]) -> Result<ShaderDataSlice, PoolError> {
        let slice = self.allocate(bytes.len() as u64)?;
        self.write(&slice, 0, bytes);
        Ok(slice)
    }

    /// Pack same-sized items back to back in one allocation
    ///
    /// Item `i` starts at `slice.offset + i * item_len`, which is how instanced
    /// shaders index per-instance blocks.
    pub fn upload_many<T: AsRef<[u8]>>(&mut self, items: &[T]) -> Result<ShaderDataSlice, PoolError> {
        let Some(first) = items.first() else {
            return self.allocate(0);
        };
        let stride = first.as_ref().len();
        for (index, item) in items.iter().enumerate() {
            let found = item.as_ref().len();
            if found != stride {
                return Err(PoolError::MismatchedItems {
                    index,
                    expected: stride,
                    found,
                });
            }
        }

        let slice = self.allocate((stride * items.len()) as u64)?;
        for (index, item) in items.iter().enumerate() {
            self.write(&slice, (index * stride) as u64, item.as_ref());
        }
        Ok(slice)
    }

    /// Advance to the next ring slot and reclaim it
    ///
    /// Call exactly once per frame boundary from the owning thread. Slices
    /// from the reclaimed slot become invalid.
    pub fn rotate(&mut self) {
        self.assert_owner();
        if self.closed {
            return;
        }
        self.slot = (self.slot + 1) % self.slots.len();

        let slot = &mut self.slots[self.slot];
        for id in slot.retired.drain(..) {
            self.buffers.remove(&id);
        }
        slot.cursor = 0;
        let in_use = std::mem::take(&mut slot.in_use);
        slot.free.extend(in_use);

        tracing::trace!(
            "Rotated shader data pool '{}' to slot {}",
            self.descriptor.label,
            self.slot
        );
    }

    /// Drop every buffer; later allocations fail
    pub fn close(&mut self) {
        self.assert_owner();
        if self.closed {
            return;
        }
        tracing::debug!(
            "Closing shader data pool '{}' ({} buffers)",
            self.descriptor.label,
            self.buffers.len()
        );
        self.buffers.clear();
        for slot in &mut self.slots {
            *slot = RingSlot::default();
        }
        self.closed = true;
    }
}
