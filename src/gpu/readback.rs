//! Texture Readback
//!
//! Copies a texture into a mappable staging buffer and strips the row
//! padding that `copy_texture_to_buffer` requires, producing tightly
//! packed texel rows in host memory.

use crate::errors::{Result, SheenError};
use crate::gpu::GpuContext;

/// Bytes per texel for the color formats the crate renders to.
pub fn bytes_per_texel(format: wgpu::TextureFormat) -> Result<u32> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm
        | wgpu::TextureFormat::Rgba8UnormSrgb
        | wgpu::TextureFormat::Bgra8Unorm
        | wgpu::TextureFormat::Bgra8UnormSrgb => Ok(4),
        wgpu::TextureFormat::Rgba16Float => Ok(8),
        wgpu::TextureFormat::Rgba32Float => Ok(16),
        other => Err(SheenError::UnsupportedFormat(other)),
    }
}

/// Row pitch rounded up to [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`].
#[inline]
#[must_use]
pub fn padded_bytes_per_row(tight: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    tight.div_ceil(align) * align
}

/// A reusable `MAP_READ` buffer sized for one texture of a fixed layout.
pub struct StagingBuffer {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    tight_bytes_per_row: u32,
    padded_bytes_per_row: u32,
}

impl StagingBuffer {
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let tight_bytes_per_row = width * bytes_per_texel(format)?;
        let padded = padded_bytes_per_row(tight_bytes_per_row);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            buffer,
            width,
            height,
            tight_bytes_per_row,
            padded_bytes_per_row: padded,
        })
    }

    /// Size in bytes of the depadded image this buffer produces.
    #[inline]
    #[must_use]
    pub fn tight_len(&self) -> usize {
        self.tight_bytes_per_row as usize * self.height as usize
    }

    /// Copies `texture` into `dst`, blocking until the GPU has finished.
    ///
    /// `dst` must be exactly [`tight_len`](Self::tight_len) bytes.
    pub fn read(&self, ctx: &GpuContext, texture: &wgpu::Texture, dst: &mut [u8]) -> Result<()> {
        if dst.len() != self.tight_len() {
            return Err(SheenError::BufferMapFailed(format!(
                "destination holds {} bytes, readback produces {}",
                dst.len(),
                self.tight_len()
            )));
        }

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.buffer.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.wait_idle()?;

        rx.recv()
            .map_err(|e| SheenError::BufferMapFailed(e.to_string()))?
            .map_err(|e| SheenError::BufferMapFailed(e.to_string()))?;

        {
            let mapped = slice.get_mapped_range();
            let tight = self.tight_bytes_per_row as usize;
            let padded = self.padded_bytes_per_row as usize;
            for (dst_row, src_row) in dst.chunks_exact_mut(tight).zip(mapped.chunks(padded)) {
                dst_row.copy_from_slice(&src_row[..tight]);
            }
        }
        self.buffer.unmap();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(256), 256);
        assert_eq!(padded_bytes_per_row(257), 512);
    }

    #[test]
    fn texel_sizes() {
        assert_eq!(bytes_per_texel(wgpu::TextureFormat::Rgba8Unorm).ok(), Some(4));
        assert_eq!(bytes_per_texel(wgpu::TextureFormat::Rgba16Float).ok(), Some(8));
        assert_eq!(bytes_per_texel(wgpu::TextureFormat::Rgba32Float).ok(), Some(16));
        assert!(bytes_per_texel(wgpu::TextureFormat::Depth32Float).is_err());
    }
}
