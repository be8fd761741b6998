//! Pixel Buffer Pool Tests
//!
//! Tests for:
//! - preallocate: layout, per-format texel sizes, zero-dimension rejection
//! - acquire / release: RAII return, outstanding accounting
//! - Blocking acquire: a waiter wakes when a group is returned
//! - Capacity: never more groups in existence than configured

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sheen::errors::SheenError;
use sheen::stream::PixelBufferPool;

const RGBA8: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const RGBA32F: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

// ============================================================================
// Preallocation
// ============================================================================

#[test]
fn preallocate_sizes_buffers_by_format() {
    let pool = PixelBufferPool::preallocate(2, &[RGBA8, RGBA32F], 8, 4).unwrap();
    let group = pool.acquire().unwrap();

    assert_eq!(group.len(), 2);
    assert_eq!(group[0].as_bytes().len(), 8 * 4 * 4);
    assert_eq!(group[1].as_bytes().len(), 8 * 4 * 16);
    assert_eq!(group[1].format(), RGBA32F);
    assert_eq!((group[0].width(), group[0].height()), (8, 4));
}

#[test]
fn preallocate_rejects_zero_dimensions() {
    for (capacity, formats, width, height) in [
        (1, &[RGBA8][..], 0, 4),
        (1, &[RGBA8][..], 4, 0),
        (1, &[][..], 4, 4),
        (0, &[RGBA8][..], 4, 4),
    ] {
        assert!(matches!(
            PixelBufferPool::preallocate(capacity, formats, width, height),
            Err(SheenError::InvalidDimensions { .. })
        ));
    }
}

#[test]
fn preallocate_rejects_unsupported_formats() {
    assert!(matches!(
        PixelBufferPool::preallocate(1, &[wgpu::TextureFormat::Depth32Float], 4, 4),
        Err(SheenError::UnsupportedFormat(_))
    ));
}

// ============================================================================
// Acquire / Release
// ============================================================================

#[test]
fn dropping_a_group_returns_it() {
    let pool = PixelBufferPool::preallocate(2, &[RGBA8], 2, 2).unwrap();
    assert_eq!(pool.capacity(), 2);
    assert_eq!(pool.outstanding(), 0);

    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    assert_eq!(pool.outstanding(), 2);
    assert!(pool.try_acquire().is_none());

    drop(a);
    assert_eq!(pool.outstanding(), 1);
    pool.release(b);
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.available(), 2);
}

#[test]
fn groups_keep_their_contents_between_uses() {
    let pool = PixelBufferPool::preallocate(1, &[RGBA8], 1, 1).unwrap();
    {
        let mut group = pool.acquire().unwrap();
        group[0].as_mut_bytes().copy_from_slice(&[1, 2, 3, 4]);
    }
    let group = pool.acquire().unwrap();
    assert_eq!(group[0].as_bytes(), &[1, 2, 3, 4]);
}

#[test]
fn acquire_blocks_until_a_group_is_released() {
    let pool = PixelBufferPool::preallocate(1, &[RGBA8], 2, 2).unwrap();
    let held = pool.acquire().unwrap();
    let acquired = AtomicBool::new(false);

    std::thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let group = pool.acquire().unwrap();
            acquired.store(true, Ordering::SeqCst);
            drop(group);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(held);
        waiter.join().unwrap();
    });

    assert!(acquired.load(Ordering::SeqCst));
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn outstanding_never_exceeds_capacity_under_contention() {
    let pool = PixelBufferPool::preallocate(3, &[RGBA8], 2, 2).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..20 {
                    let group = pool.acquire().unwrap();
                    assert!(pool.outstanding() <= pool.capacity());
                    drop(group);
                }
            });
        }
    });

    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.available(), 3);
}
