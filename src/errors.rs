//! Error Types
//!
//! This module defines the error type used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`SheenError`] covers all failure modes including:
//! - GPU initialization and readback failures
//! - Render target / buffer layout violations
//! - Shader template resolution errors
//! - Prior-solution loading and image decoding errors
//! - Per-view streaming failures
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, SheenError>`.
//!
//! ```rust,ignore
//! use sheen::errors::{SheenError, Result};
//!
//! fn finalize() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for the crate.
#[derive(Error, Debug)]
pub enum SheenError {
    // ========================================================================
    // GPU Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Mapping a readback staging buffer failed.
    #[error("Failed to map readback buffer: {0}")]
    BufferMapFailed(String),

    /// The texture format cannot be read back or persisted.
    #[error("Unsupported texture format: {0:?}")]
    UnsupportedFormat(wgpu::TextureFormat),

    // ========================================================================
    // Render Target & Buffer Errors
    // ========================================================================
    /// A render target or buffer pool was requested with a zero dimension.
    #[error("Invalid dimensions: {width}x{height} with {attachments} attachment(s)")]
    InvalidDimensions {
        /// Requested width in texels
        width: u32,
        /// Requested height in texels
        height: u32,
        /// Requested attachment count
        attachments: usize,
    },

    /// Two render targets (or a target and a program) disagree on layout.
    #[error("Attachment layout mismatch: expected {expected}, got {actual}")]
    AttachmentMismatch {
        /// Expected attachment / input count
        expected: usize,
        /// Actual attachment / input count
        actual: usize,
    },

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// The shader source could not be found on disk or in the embedded set.
    #[error("Shader source not found: {0}")]
    ShaderNotFound(String),

    /// The shader template failed to render.
    #[error("Shader template error: {0}")]
    ShaderTemplate(String),

    // ========================================================================
    // Solution I/O Errors
    // ========================================================================
    /// A required file of a previously saved solution is missing.
    #[error("Missing solution file: {}", .0.display())]
    MissingSolutionFile(PathBuf),

    /// Image decoding or encoding error.
    #[error("Image error: {0}")]
    ImageDecodeError(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Settings file parsing error.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ========================================================================
    // Pass & Streaming Errors
    // ========================================================================
    /// The hole-fill operator could not complete.
    #[error("Hole fill failed: {0}")]
    HoleFill(String),

    /// A single view failed while streaming.
    #[error("View {index} failed: {source}")]
    ViewFailed {
        /// Index of the view that failed
        index: usize,
        /// Underlying failure
        #[source]
        source: Box<SheenError>,
    },

    /// A consumer worker panicked while handling a view.
    #[error("Worker for view {0} panicked")]
    WorkerPanicked(usize),

    /// The pixel buffer pool was torn down while a caller waited on it.
    #[error("Pixel buffer pool closed")]
    PoolClosed,

    /// The stream was re-entered from its own draw step or consumer.
    #[error("View stream is already running")]
    StreamBusy,
}

impl SheenError {
    /// Attaches a view index to this error, unless one is already attached.
    #[must_use]
    pub fn for_view(self, index: usize) -> Self {
        match self {
            Self::ViewFailed { .. } | Self::WorkerPanicked(_) => self,
            other => Self::ViewFailed {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Returns the view index this error refers to, if any.
    #[must_use]
    pub fn view_index(&self) -> Option<usize> {
        match self {
            Self::ViewFailed { index, .. } | Self::WorkerPanicked(index) => Some(*index),
            _ => None,
        }
    }
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<image::ImageError> for SheenError {
    fn from(err: image::ImageError) -> Self {
        SheenError::ImageDecodeError(err.to_string())
    }
}

impl From<minijinja::Error> for SheenError {
    fn from(err: minijinja::Error) -> Self {
        match err.kind() {
            minijinja::ErrorKind::TemplateNotFound => {
                SheenError::ShaderNotFound(err.detail().unwrap_or_default().to_string())
            }
            _ => SheenError::ShaderTemplate(err.to_string()),
        }
    }
}

/// Alias for `Result<T, SheenError>`.
pub type Result<T> = std::result::Result<T, SheenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_view_wraps_once() {
        let err = SheenError::HoleFill("boom".into()).for_view(3).for_view(7);
        assert_eq!(err.view_index(), Some(3));
        assert!(err.to_string().starts_with("View 3 failed"));
    }

    #[test]
    fn worker_panic_keeps_its_index() {
        let err = SheenError::WorkerPanicked(5).for_view(9);
        assert_eq!(err.view_index(), Some(5));
    }
}
