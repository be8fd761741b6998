//! The render-target seam between the stream engine and the GPU.

use crate::errors::Result;

/// Off-screen storage with a fixed number of color attachments.
///
/// [`Framebuffer`](crate::gpu::Framebuffer) is the GPU implementation. Tests
/// substitute CPU-side targets to exercise streaming without an adapter.
pub trait RenderTarget {
    /// Number of attachments. Never changes after creation.
    fn attachment_count(&self) -> usize;

    /// Size of every attachment, in texels.
    fn size(&self) -> (u32, u32);

    /// Format of attachment `index`.
    ///
    /// # Panics
    /// Panics if `index >= attachment_count()`.
    fn attachment_format(&self, index: usize) -> wgpu::TextureFormat;

    fn clear_attachment(&mut self, index: usize, color: wgpu::Color) -> Result<()>;

    /// Clears every attachment to `color`.
    ///
    /// Targets that can clear all attachments at once should override this.
    fn clear_all_attachments(&mut self, color: wgpu::Color) -> Result<()> {
        (0..self.attachment_count()).try_for_each(|index| self.clear_attachment(index, color))
    }

    /// Copies attachment `index` into `dst` as tightly packed rows.
    fn read_attachment(&mut self, index: usize, dst: &mut [u8]) -> Result<()>;
}
