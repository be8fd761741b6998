//! Offscreen Framebuffers
//!
//! A [`Framebuffer`] is a fixed set of equally sized color attachments.
//! It is the GPU-backed [`RenderTarget`] used by view streams and by the
//! finalization passes.
//!
//! ```text
//!   FramebufferBuilder::new(ctx, w, h)
//!       .add_color_attachment(Rgba8Unorm)   ──► attachment 0
//!       .add_color_attachment(Rgba8Unorm)   ──► attachment 1
//!       .build()?
//! ```

use std::sync::Arc;

use image::RgbaImage;

use crate::errors::{Result, SheenError};
use crate::gpu::readback::StagingBuffer;
use crate::gpu::{GpuContext, Texture2D};
use crate::stream::RenderTarget;

// ─── Builder ─────────────────────────────────────────────────────────────────

pub struct FramebufferBuilder {
    ctx: Arc<GpuContext>,
    width: u32,
    height: u32,
    label: String,
    formats: Vec<wgpu::TextureFormat>,
}

impl FramebufferBuilder {
    #[must_use]
    pub fn new(ctx: Arc<GpuContext>, width: u32, height: u32) -> Self {
        Self {
            ctx,
            width,
            height,
            label: "Framebuffer".to_string(),
            formats: Vec::new(),
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn add_color_attachment(mut self, format: wgpu::TextureFormat) -> Self {
        self.formats.push(format);
        self
    }

    /// Adds `count` attachments of the same format.
    #[must_use]
    pub fn add_color_attachments(mut self, format: wgpu::TextureFormat, count: usize) -> Self {
        self.formats.extend(std::iter::repeat_n(format, count));
        self
    }

    pub fn build(self) -> Result<Framebuffer> {
        let max = self.ctx.max_texture_dimension();
        if self.width == 0
            || self.height == 0
            || self.width > max
            || self.height > max
            || self.formats.is_empty()
        {
            return Err(SheenError::InvalidDimensions {
                width: self.width,
                height: self.height,
                attachments: self.formats.len(),
            });
        }

        let attachments = self
            .formats
            .iter()
            .enumerate()
            .map(|(i, &format)| {
                Texture2D::new(
                    &self.ctx,
                    &format!("{} Attachment {i}", self.label),
                    self.width,
                    self.height,
                    format,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let staging = attachments.iter().map(|_| None).collect();

        Ok(Framebuffer {
            ctx: self.ctx,
            width: self.width,
            height: self.height,
            attachments,
            staging,
        })
    }
}

// ─── Framebuffer ─────────────────────────────────────────────────────────────

pub struct Framebuffer {
    ctx: Arc<GpuContext>,
    width: u32,
    height: u32,
    attachments: Vec<Texture2D>,
    /// Lazily created readback buffers, one per attachment.
    staging: Vec<Option<StagingBuffer>>,
}

impl Framebuffer {
    /// Returns attachment `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    #[must_use]
    pub fn attachment(&self, index: usize) -> &Texture2D {
        &self.attachments[index]
    }

    #[inline]
    #[must_use]
    pub fn attachments(&self) -> &[Texture2D] {
        &self.attachments
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// True when `other` has the same size and attachment formats.
    #[must_use]
    pub fn layout_matches(&self, other: &Framebuffer) -> bool {
        self.size() == other.size()
            && self.attachments.len() == other.attachments.len()
            && self
                .attachments
                .iter()
                .zip(&other.attachments)
                .all(|(a, b)| a.format() == b.format())
    }

    /// Clears every attachment to `color` in a single pass.
    pub fn clear_all(&self, color: wgpu::Color) {
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Framebuffer Clear"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Framebuffer Clear Pass"),
                color_attachments: &self.color_attachments(Some(color)),
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Clears one attachment to `color`.
    pub fn clear_color_buffer(&self, index: usize, color: wgpu::Color) -> Result<()> {
        let target = self.checked(index)?;
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Attachment Clear"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Attachment Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Overwrites attachment `index` with an 8-bit RGBA image.
    ///
    /// The image is resized to the framebuffer when the sizes differ.
    pub fn upload_rgba8(&self, index: usize, image: &RgbaImage) -> Result<()> {
        let target = self.checked(index)?;
        if image.dimensions() == (self.width, self.height) {
            target.upload_rgba8(&self.ctx, image)
        } else {
            log::debug!(
                "Resizing {}x{} image to {}x{} for attachment {index}",
                image.width(),
                image.height(),
                self.width,
                self.height
            );
            let resized = image::imageops::resize(
                image,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            target.upload_rgba8(&self.ctx, &resized)
        }
    }

    /// Copies attachment `index` of `source` into attachment `index` of `self`.
    pub fn copy_attachment_from(&self, source: &Framebuffer, index: usize) -> Result<()> {
        let dst = self.checked(index)?;
        let src = source.checked(index)?;
        if src.size() != dst.size() || src.format() != dst.format() {
            return Err(SheenError::AttachmentMismatch {
                expected: self.attachments.len(),
                actual: source.attachments.len(),
            });
        }
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Attachment Copy"),
            });
        encoder.copy_texture_to_texture(
            src.texture().as_image_copy(),
            dst.texture().as_image_copy(),
            dst.extent(),
        );
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Color attachment descriptors for a pass writing every attachment.
    ///
    /// `clear` of `None` preserves the current contents.
    #[must_use]
    pub fn color_attachments(
        &self,
        clear: Option<wgpu::Color>,
    ) -> Vec<Option<wgpu::RenderPassColorAttachment<'_>>> {
        let load = clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);
        self.attachments
            .iter()
            .map(|texture| {
                Some(wgpu::RenderPassColorAttachment {
                    view: texture.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect()
    }

    fn checked(&self, index: usize) -> Result<&Texture2D> {
        self.attachments
            .get(index)
            .ok_or(SheenError::AttachmentMismatch {
                expected: index + 1,
                actual: self.attachments.len(),
            })
    }
}

impl RenderTarget for Framebuffer {
    fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn attachment_format(&self, index: usize) -> wgpu::TextureFormat {
        self.attachments[index].format()
    }

    fn clear_attachment(&mut self, index: usize, color: wgpu::Color) -> Result<()> {
        self.clear_color_buffer(index, color)
    }

    fn clear_all_attachments(&mut self, color: wgpu::Color) -> Result<()> {
        self.clear_all(color);
        Ok(())
    }

    fn read_attachment(&mut self, index: usize, dst: &mut [u8]) -> Result<()> {
        let Some(texture) = self.attachments.get(index) else {
            return Err(SheenError::AttachmentMismatch {
                expected: index + 1,
                actual: self.attachments.len(),
            });
        };
        if self.staging[index].is_none() {
            let staging =
                StagingBuffer::new(&self.ctx.device, self.width, self.height, texture.format())?;
            self.staging[index] = Some(staging);
        }
        match &self.staging[index] {
            Some(staging) => staging.read(&self.ctx, texture.texture(), dst),
            None => Err(SheenError::BufferMapFailed("staging buffer unavailable".into())),
        }
    }
}
