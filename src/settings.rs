//! Finalization & Streaming Settings
//!
//! Plain configuration structs consumed once at construction time by the
//! [`GpuContext`](crate::gpu::GpuContext), the view stream factory and the
//! finalization optimizers.
//!
//! Every struct implements [`Default`] and derives `serde`, so a complete
//! configuration can be loaded from a JSON file where any omitted field
//! falls back to its default:
//!
//! ```rust,ignore
//! use sheen::settings::{FinalizeSettings, TextureResolution};
//!
//! let settings = FinalizeSettings::default()
//!     .with_resolution(TextureResolution::new(1024, 1024))
//!     .with_constant(true);
//!
//! let from_disk = FinalizeSettings::from_json_file("finalize.json")?;
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::Result;

// ---------------------------------------------------------------------------
// TextureResolution
// ---------------------------------------------------------------------------

/// Size of the output texture maps, in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureResolution {
    pub width: u32,
    pub height: u32,
}

impl Default for TextureResolution {
    fn default() -> Self {
        Self::new(2048, 2048)
    }
}

impl TextureResolution {
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Larger of the two dimensions. Used as the default hole-fill
    /// iteration count, which lets a single valid texel propagate across
    /// the whole map.
    #[inline]
    #[must_use]
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    #[must_use]
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl From<(u32, u32)> for TextureResolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

// ---------------------------------------------------------------------------
// HoleFillSettings
// ---------------------------------------------------------------------------

/// Configuration of the ping-pong hole-fill operator.
///
/// | Field            | Description                                   | Default              |
/// |------------------|-----------------------------------------------|----------------------|
/// | `enabled`        | Run hole filling after the diffuse pass       | `true`               |
/// | `iterations`     | Number of fill passes                         | `max(width, height)` |
/// | `min_fill_alpha` | Alpha at or above which a texel counts valid  | `0.5`                |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleFillSettings {
    pub enabled: bool,
    pub iterations: Option<u32>,
    pub min_fill_alpha: f32,
}

impl Default for HoleFillSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            iterations: None,
            min_fill_alpha: 0.5,
        }
    }
}

impl HoleFillSettings {
    /// Resolves the iteration count for a map of the given resolution.
    #[inline]
    #[must_use]
    pub fn iterations_for(&self, resolution: TextureResolution) -> u32 {
        self.iterations.unwrap_or_else(|| resolution.max_dimension())
    }
}

// ---------------------------------------------------------------------------
// StreamSettings
// ---------------------------------------------------------------------------

/// Parallelism bound for view streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Maximum number of consumer threads outstanding at once.
    pub max_running_threads: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_running_threads: default_max_running_threads(),
        }
    }
}

impl StreamSettings {
    /// The configured bound, clamped to at least one worker.
    #[inline]
    #[must_use]
    pub fn bound(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_running_threads).unwrap_or(NonZeroUsize::MIN)
    }
}

/// One thread is always dedicated to the GPU context, so the default
/// leaves it out of the consumer budget.
#[must_use]
pub fn default_max_running_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

// ---------------------------------------------------------------------------
// GpuSettings
// ---------------------------------------------------------------------------

/// GPU adapter selection strategy (serializable mirror of
/// [`wgpu::PowerPreference`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterPreference {
    /// Let the backend decide.
    None,
    /// Prefer integrated GPUs.
    LowPower,
    /// Prefer discrete / dedicated GPUs.
    #[default]
    HighPerformance,
}

impl From<AdapterPreference> for wgpu::PowerPreference {
    fn from(value: AdapterPreference) -> Self {
        match value {
            AdapterPreference::None => wgpu::PowerPreference::None,
            AdapterPreference::LowPower => wgpu::PowerPreference::LowPower,
            AdapterPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// Headless GPU context configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    pub power_preference: AdapterPreference,
    /// Force a software adapter (useful on CI machines without a GPU).
    pub force_fallback_adapter: bool,
}

// ---------------------------------------------------------------------------
// FinalizeSettings
// ---------------------------------------------------------------------------

/// Complete configuration for building a fresh finalization solution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizeSettings {
    pub resolution: TextureResolution,
    pub hole_fill: HoleFillSettings,
    pub stream: StreamSettings,
    pub gpu: GpuSettings,
    /// Estimate a constant (translucency) term alongside the diffuse map.
    pub include_constant: bool,
    /// Directory searched for shader sources before the embedded set.
    pub shader_root: Option<PathBuf>,
}

impl FinalizeSettings {
    #[must_use]
    pub fn with_resolution(mut self, resolution: TextureResolution) -> Self {
        self.resolution = resolution;
        self
    }

    #[must_use]
    pub fn with_constant(mut self, include_constant: bool) -> Self {
        self.include_constant = include_constant;
        self
    }

    #[must_use]
    pub fn with_hole_fill(mut self, hole_fill: HoleFillSettings) -> Self {
        self.hole_fill = hole_fill;
        self
    }

    #[must_use]
    pub fn with_shader_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.shader_root = Some(root.into());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }
}
