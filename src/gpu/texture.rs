//! GPU 2D Textures
//!
//! [`Texture2D`] pairs a `wgpu::Texture` with its default view and records
//! the layout needed to upload, read back and persist it.

use std::path::Path;

use image::RgbaImage;

use crate::errors::{Result, SheenError};
use crate::gpu::GpuContext;
use crate::gpu::readback::{StagingBuffer, bytes_per_texel};

/// Usage shared by every texture the crate creates: any map may be sampled,
/// rendered into, uploaded to, and read back.
pub(crate) const TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

pub struct Texture2D {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl std::fmt::Debug for Texture2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture2D")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl Texture2D {
    /// Creates an uninitialized texture.
    ///
    /// Fails with [`SheenError::InvalidDimensions`] when the size is empty or
    /// exceeds the device limit, and with [`SheenError::UnsupportedFormat`]
    /// when the adapter cannot render into, sample and copy `format`.
    pub fn new(
        ctx: &GpuContext,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let max = ctx.max_texture_dimension();
        if width == 0 || height == 0 || width > max || height > max {
            return Err(SheenError::InvalidDimensions {
                width,
                height,
                attachments: 1,
            });
        }
        bytes_per_texel(format)?;
        if !ctx.supports_format(format, TEXTURE_USAGE) {
            log::warn!(
                "Format {format:?} does not allow {TEXTURE_USAGE:?} on '{}'",
                ctx.adapter_info.name
            );
            return Err(SheenError::UnsupportedFormat(format));
        }

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: TEXTURE_USAGE,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            width,
            height,
            format,
        })
    }

    /// Uploads an 8-bit RGBA image into a new `Rgba8Unorm` texture.
    pub fn from_rgba8(ctx: &GpuContext, label: &str, image: &RgbaImage) -> Result<Self> {
        let texture = Self::new(
            ctx,
            label,
            image.width(),
            image.height(),
            wgpu::TextureFormat::Rgba8Unorm,
        )?;
        texture.upload_rgba8(ctx, image)?;
        Ok(texture)
    }

    /// A 1x1 texture filled with a single color.
    pub fn solid(ctx: &GpuContext, label: &str, rgba: [u8; 4]) -> Result<Self> {
        Self::from_rgba8(ctx, label, &RgbaImage::from_pixel(1, 1, image::Rgba(rgba)))
    }

    /// Replaces the texture contents with `image`, which must match its size.
    pub fn upload_rgba8(&self, ctx: &GpuContext, image: &RgbaImage) -> Result<()> {
        if self.format != wgpu::TextureFormat::Rgba8Unorm {
            return Err(SheenError::UnsupportedFormat(self.format));
        }
        if image.dimensions() != self.size() {
            return Err(SheenError::InvalidDimensions {
                width: image.width(),
                height: image.height(),
                attachments: 1,
            });
        }

        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
        Ok(())
    }

    /// Reads the raw texel bytes back to host memory.
    pub fn read_bytes(&self, ctx: &GpuContext) -> Result<Vec<u8>> {
        let staging = StagingBuffer::new(&ctx.device, self.width, self.height, self.format)?;
        let mut bytes = vec![0u8; staging.tight_len()];
        staging.read(ctx, &self.texture, &mut bytes)?;
        Ok(bytes)
    }

    /// Reads the texture back as an 8-bit RGBA image.
    pub fn read_rgba8(&self, ctx: &GpuContext) -> Result<RgbaImage> {
        match self.format {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {}
            other => return Err(SheenError::UnsupportedFormat(other)),
        }
        let bytes = self.read_bytes(ctx)?;
        RgbaImage::from_raw(self.width, self.height, bytes).ok_or(SheenError::InvalidDimensions {
            width: self.width,
            height: self.height,
            attachments: 1,
        })
    }

    pub fn save_png(&self, ctx: &GpuContext, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.read_rgba8(ctx)?
            .save_with_format(path, image::ImageFormat::Png)?;
        log::debug!("Saved {}x{} texture to {}", self.width, self.height, path.display());
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    #[inline]
    #[must_use]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}
