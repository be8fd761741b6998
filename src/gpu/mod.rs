//! GPU plumbing: headless context, textures, offscreen framebuffers and
//! texture readback.

pub mod context;
pub mod framebuffer;
pub mod readback;
pub mod texture;

pub use context::GpuContext;
pub use framebuffer::{Framebuffer, FramebufferBuilder};
pub use readback::{StagingBuffer, bytes_per_texel, padded_bytes_per_row};
pub use texture::Texture2D;
