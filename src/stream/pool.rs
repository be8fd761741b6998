//! Pixel Buffer Pool
//!
//! CPU-side storage for per-view readback results, allocated once up front
//! and recycled between views.
//!
//! ```text
//!   ┌──────────────────── PixelBufferPool (capacity = M) ───────────────────┐
//!   │  free channel:  [group] [group] ...                                   │
//!   └──────┬─────────────────────────────────────────────────▲──────────────┘
//!          │ acquire() (blocks while empty)                  │ PooledGroup::drop
//!          ▼                                                 │
//!     GPU thread: readback ──► worker thread: consumer ──────┘
//! ```
//!
//! A [`BufferGroup`] holds one [`PixelBuffer`] per render-target attachment.
//! Groups travel through a bounded `flume` channel, so a group is owned by
//! exactly one party at any time and `acquire` blocks without polling when
//! every group is in flight.

use std::ops::{Deref, DerefMut, Index, IndexMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{Result, SheenError};
use crate::gpu::bytes_per_texel;

// ─── PixelBuffer ─────────────────────────────────────────────────────────────

/// Tightly packed texel rows read back from one attachment.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    texel_size: usize,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat) -> Result<Self> {
        let texel_size = bytes_per_texel(format)? as usize;
        Ok(Self {
            data: vec![0; width as usize * height as usize * texel_size],
            width,
            height,
            format,
            texel_size,
        })
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Reads texel (x, y) as normalized RGBA.
    ///
    /// # Panics
    /// Panics if the coordinate lies outside the buffer.
    #[must_use]
    pub fn texel_f32(&self, x: u32, y: u32) -> [f32; 4] {
        assert!(x < self.width && y < self.height, "texel ({x}, {y}) out of range");
        let offset = (y as usize * self.width as usize + x as usize) * self.texel_size;
        let texel = &self.data[offset..offset + self.texel_size];
        decode_texel(self.format, texel)
    }

    /// Iterates all texels in row-major order as normalized RGBA.
    pub fn texels_f32(&self) -> impl Iterator<Item = [f32; 4]> + '_ {
        self.data
            .chunks_exact(self.texel_size)
            .map(|texel| decode_texel(self.format, texel))
    }
}

fn decode_texel(format: wgpu::TextureFormat, texel: &[u8]) -> [f32; 4] {
    let mut out = [0.0; 4];
    match format {
        wgpu::TextureFormat::Rgba32Float => {
            for (value, bytes) in out.iter_mut().zip(texel.chunks_exact(4)) {
                *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
        }
        wgpu::TextureFormat::Rgba16Float => {
            for (value, bytes) in out.iter_mut().zip(texel.chunks_exact(2)) {
                *value = half::f16::from_le_bytes([bytes[0], bytes[1]]).to_f32();
            }
        }
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            out = [
                f32::from(texel[2]) / 255.0,
                f32::from(texel[1]) / 255.0,
                f32::from(texel[0]) / 255.0,
                f32::from(texel[3]) / 255.0,
            ];
        }
        _ => {
            for (value, &byte) in out.iter_mut().zip(texel) {
                *value = f32::from(byte) / 255.0;
            }
        }
    }
    out
}

// ─── BufferGroup ─────────────────────────────────────────────────────────────

/// One [`PixelBuffer`] per attachment.
#[derive(Debug, Clone, Default)]
pub struct BufferGroup {
    buffers: Vec<PixelBuffer>,
}

impl BufferGroup {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PixelBuffer> {
        self.buffers.iter()
    }
}

impl Index<usize> for BufferGroup {
    type Output = PixelBuffer;

    fn index(&self, index: usize) -> &PixelBuffer {
        &self.buffers[index]
    }
}

impl IndexMut<usize> for BufferGroup {
    fn index_mut(&mut self, index: usize) -> &mut PixelBuffer {
        &mut self.buffers[index]
    }
}

// ─── PixelBufferPool ─────────────────────────────────────────────────────────

pub struct PixelBufferPool {
    capacity: usize,
    formats: Vec<wgpu::TextureFormat>,
    width: u32,
    height: u32,
    free_tx: flume::Sender<BufferGroup>,
    free_rx: flume::Receiver<BufferGroup>,
    outstanding: AtomicUsize,
}

impl PixelBufferPool {
    /// Allocates `capacity` groups, each with one buffer per entry of
    /// `formats`, sized `width` x `height`.
    pub fn preallocate(
        capacity: usize,
        formats: &[wgpu::TextureFormat],
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if capacity == 0 || formats.is_empty() || width == 0 || height == 0 {
            return Err(SheenError::InvalidDimensions {
                width,
                height,
                attachments: formats.len(),
            });
        }

        let (free_tx, free_rx) = flume::bounded(capacity);
        for _ in 0..capacity {
            let buffers = formats
                .iter()
                .map(|&format| PixelBuffer::new(width, height, format))
                .collect::<Result<Vec<_>>>()?;
            free_tx
                .send(BufferGroup { buffers })
                .map_err(|_| SheenError::PoolClosed)?;
        }

        log::debug!(
            "Preallocated {capacity} buffer group(s) of {} attachment(s) at {width}x{height}",
            formats.len()
        );

        Ok(Self {
            capacity,
            formats: formats.to_vec(),
            width,
            height,
            free_tx,
            free_rx,
            outstanding: AtomicUsize::new(0),
        })
    }

    /// Takes a group, blocking while every group is in flight.
    pub fn acquire(&self) -> Result<PooledGroup<'_>> {
        let group = self.free_rx.recv().map_err(|_| SheenError::PoolClosed)?;
        Ok(self.checkout(group))
    }

    /// Takes a group if one is free.
    pub fn try_acquire(&self) -> Option<PooledGroup<'_>> {
        self.free_rx.try_recv().ok().map(|group| self.checkout(group))
    }

    /// Returns a group to the pool. Equivalent to dropping it.
    pub fn release(&self, group: PooledGroup<'_>) {
        debug_assert!(std::ptr::eq(group.pool, self), "group released to a foreign pool");
        drop(group);
    }

    fn checkout(&self, group: BufferGroup) -> PooledGroup<'_> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        PooledGroup { group, pool: self }
    }

    fn give_back(&self, group: BufferGroup) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        // The channel is sized to capacity and the pool holds the receiver,
        // so this never blocks and never fails.
        let _ = self.free_tx.try_send(group);
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of groups currently checked out.
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    /// True if the pool's groups match this layout.
    #[must_use]
    pub fn matches(&self, formats: &[wgpu::TextureFormat], width: u32, height: u32) -> bool {
        self.formats == formats && self.width == width && self.height == height
    }
}

// ─── PooledGroup ─────────────────────────────────────────────────────────────

/// A checked-out [`BufferGroup`]. Dropping it returns the group to its pool.
pub struct PooledGroup<'p> {
    group: BufferGroup,
    pool: &'p PixelBufferPool,
}

impl Deref for PooledGroup<'_> {
    type Target = BufferGroup;

    fn deref(&self) -> &BufferGroup {
        &self.group
    }
}

impl DerefMut for PooledGroup<'_> {
    fn deref_mut(&mut self) -> &mut BufferGroup {
        &mut self.group
    }
}

impl Drop for PooledGroup<'_> {
    fn drop(&mut self) {
        let group = std::mem::take(&mut self.group);
        self.pool.give_back(group);
    }
}
