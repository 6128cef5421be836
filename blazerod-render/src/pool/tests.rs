//! Tests for the shader data pool

use std::borrow::Cow;

use super::gpu::pad_to_copy_alignment;
use super::*;

fn storage_pool(depth: usize) -> ShaderDataPool<MemoryBackend> {
    let descriptor = PoolDescriptor::storage("test", 16)
        .with_ring_depth(depth)
        .with_initial_capacity(256);
    ShaderDataPool::new(MemoryBackend::new(), descriptor).unwrap()
}

#[test]
fn test_ring_depth_must_be_at_least_two() {
    let descriptor = PoolDescriptor::storage("test", 0).with_ring_depth(1);
    assert_eq!(
        ShaderDataPool::new(MemoryBackend::new(), descriptor).err(),
        Some(PoolError::RingDepth(1))
    );
}

#[test]
fn test_slices_are_aligned_and_disjoint() {
    let mut pool = storage_pool(2);
    let a = pool.allocate(10).unwrap();
    let b = pool.allocate(20).unwrap();
    assert_eq!(a.offset, 0);
    assert_eq!(b.offset, 16);
    assert_eq!(a.buffer, b.buffer);
    assert!(!a.overlaps(&b));
    assert_eq!(pool.buffer_count(), 1);
}

#[test]
fn test_zero_sized_allocation_is_empty() {
    let mut pool = storage_pool(2);
    let empty = pool.allocate(0).unwrap();
    assert_eq!(empty, ShaderDataSlice::EMPTY);
    assert!(empty.is_empty());
    assert_eq!(pool.read(&empty), Some(&[][..]));
    assert_eq!(pool.buffer_count(), 0);
}

#[test]
fn test_growth_is_geometric_and_retires_old_buffer() {
    let mut pool = storage_pool(2);
    let first = pool.upload(&[1; 200]).unwrap();
    // 208 + 100 > 256: the slot grows to 512 and keeps the old buffer alive
    let second = pool.upload(&[2; 100]).unwrap();
    assert_ne!(first.buffer, second.buffer);
    assert_eq!(second.offset, 0);
    assert_eq!(pool.slot_capacity(0), 256 + 512);
    assert_eq!(pool.read(&first).unwrap(), &[1; 200][..]);

    // A request larger than double the capacity grows straight past it
    let big = pool.allocate(5000).unwrap();
    assert_eq!(big.offset, 0);
    assert_eq!(pool.slot_capacity(0), 256 + 512 + 8192);
}

#[test]
fn test_rotation_reclaims_slot_after_ring_wraps() {
    let mut pool = storage_pool(2);

    let a = pool.upload(&[0xAA; 64]).unwrap();
    pool.rotate();
    let b = pool.upload(&[0xBB; 64]).unwrap();
    assert_ne!(a.buffer, b.buffer);
    // Slot A is still in flight while B is written
    assert_eq!(pool.read(&a).unwrap(), &[0xAA; 64][..]);

    pool.rotate();
    assert_eq!(pool.current_slot(), 0);
    let reused = pool.upload(&[0xCC; 64]).unwrap();
    assert_eq!(reused.buffer, a.buffer);
    assert_eq!(reused.offset, a.offset);
    assert_eq!(pool.read(&reused).unwrap(), &[0xCC; 64][..]);
    // B's frame is untouched
    assert_eq!(pool.read(&b).unwrap(), &[0xBB; 64][..]);
}

#[test]
fn test_retired_buffers_are_dropped_when_slot_comes_back() {
    let mut pool = storage_pool(2);
    pool.allocate(200).unwrap();
    pool.allocate(200).unwrap();
    assert_eq!(pool.buffer_count(), 2);

    pool.rotate();
    assert_eq!(pool.buffer_count(), 2);
    pool.rotate();
    // Only the grown buffer survives, reused from offset zero
    assert_eq!(pool.buffer_count(), 1);
    assert_eq!(pool.slot_capacity(0), 512);
    assert_eq!(pool.allocate(300).unwrap().offset, 0);
}

#[test]
fn test_upload_many_packs_items() {
    let mut pool = storage_pool(2);
    let items: [&[u8]; 3] = [&[1, 1, 1, 1], &[2, 2, 2, 2], &[3, 3, 3, 3]];
    let slice = pool.upload_many(&items).unwrap();
    assert_eq!(slice.size, 12);
    assert_eq!(pool.read(&slice).unwrap(), &[1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);

    let mismatched: [&[u8]; 2] = [&[1, 2], &[1, 2, 3]];
    assert_eq!(
        pool.upload_many(&mismatched),
        Err(PoolError::MismatchedItems {
            index: 1,
            expected: 2,
            found: 3
        })
    );
    let none: [&[u8]; 0] = [];
    assert!(pool.upload_many(&none).unwrap().is_empty());
}

#[test]
fn test_non_slicing_pool_recycles_whole_buffers() {
    let descriptor = PoolDescriptor::vertex("vertices", Backing::Vertex).with_ring_depth(2);
    let mut pool = ShaderDataPool::new(MemoryBackend::new(), descriptor).unwrap();

    let a = pool.allocate(100).unwrap();
    let b = pool.allocate(100).unwrap();
    assert_ne!(a.buffer, b.buffer);
    assert_eq!((a.offset, b.offset), (0, 0));

    pool.rotate();
    let c = pool.allocate(100).unwrap();
    assert_ne!(c.buffer, a.buffer);
    pool.rotate();
    // Back in slot 0: the smallest fitting free buffer is reused
    let d = pool.allocate(50).unwrap();
    assert!(d.buffer == a.buffer || d.buffer == b.buffer);
    assert_eq!(pool.buffer_count(), 3);
}

#[test]
fn test_too_large_and_closed() {
    let descriptor = PoolDescriptor::storage("small", 4);
    let mut pool = ShaderDataPool::new(MemoryBackend::with_max_buffer_size(1024), descriptor).unwrap();
    assert_eq!(
        pool.allocate(2048),
        Err(PoolError::TooLarge { size: 2048, max: 1024 })
    );
    // Growth is capped by the backend limit
    let slice = pool.allocate(1000).unwrap();
    assert_eq!(pool.slot_capacity(0), 1024);
    assert_eq!(slice.size, 1000);

    pool.close();
    assert!(pool.is_closed());
    assert_eq!(pool.buffer_count(), 0);
    assert_eq!(pool.allocate(4), Err(PoolError::Closed("small".into())));
}

#[test]
fn test_texel_and_uniform_pools_stay_within_uniform_limit() {
    let backend = MemoryBackend::new().with_max_uniform_size(1000);
    let descriptor = PoolDescriptor::texel("texel", 16).with_initial_capacity(256);
    let mut texel = ShaderDataPool::new(backend.clone(), descriptor).unwrap();
    assert_eq!(
        texel.allocate(1001),
        Err(PoolError::TooLarge { size: 1001, max: 1000 })
    );

    // 256 -> 512 fits the first slice; the second would double to 1024
    texel.allocate(300).unwrap();
    assert_eq!(texel.slot_capacity(0), 512);
    let slice = texel.allocate(600).unwrap();
    assert_eq!(texel.slot_capacity(0), 512 + 1000);
    assert_eq!((slice.offset, slice.size), (0, 600));

    let mut uniform =
        ShaderDataPool::new(backend.clone(), PoolDescriptor::uniform("uniform", 16)).unwrap();
    assert!(matches!(uniform.allocate(2048), Err(PoolError::TooLarge { .. })));

    // Storage pools keep the buffer size limit
    let mut storage = ShaderDataPool::new(backend, PoolDescriptor::storage("storage", 16)).unwrap();
    storage.allocate(2048).unwrap();
}

#[test]
fn test_copy_alignment_padding() {
    let aligned = [0u8; 8];
    assert!(matches!(pad_to_copy_alignment(&aligned), Cow::Borrowed(_)));

    let odd = [7u8; 6];
    let padded = pad_to_copy_alignment(&odd);
    assert!(matches!(padded, Cow::Owned(_)));
    assert_eq!(&padded[..], &[7, 7, 7, 7, 7, 7, 0, 0]);
}
