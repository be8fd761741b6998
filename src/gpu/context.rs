//! Headless GPU Context
//!
//! The [`GpuContext`] holds the core GPU handles used by every pass in the
//! crate. Unlike an on-screen renderer there is no surface: all work lands
//! in offscreen framebuffers and is read back to host memory.

use crate::errors::{Result, SheenError};
use crate::settings::GpuSettings;

/// Core wgpu context holding GPU handles.
///
/// - `device`: GPU device for resource creation
/// - `queue`: Command submission queue
/// - `adapter`: The adapter the device was created on, queried for format support
/// - `adapter_info`: Identification of the selected adapter, for logging
///
/// The context is shared as `Arc<GpuContext>`; only the thread that owns a
/// render target records commands against it.
pub struct GpuContext {
    /// The wgpu device for GPU operations
    pub device: wgpu::Device,
    /// The command queue for submitting work
    pub queue: wgpu::Queue,
    /// The adapter backing `device`
    pub adapter: wgpu::Adapter,
    /// Information about the adapter the device was created on
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    pub async fn new(settings: &GpuSettings) -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference.into(),
                compatible_surface: None,
                force_fallback_adapter: settings.force_fallback_adapter,
            })
            .await
            .map_err(|e| SheenError::AdapterRequestFailed(e.to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using adapter '{}' ({:?}, {:?})",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Sheen Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        Ok(Self {
            device,
            queue,
            adapter,
            adapter_info,
        })
    }

    /// Blocking variant of [`GpuContext::new`] for callers without an executor.
    pub fn new_blocking(settings: &GpuSettings) -> Result<Self> {
        pollster::block_on(Self::new(settings))
    }

    /// Blocks until all submitted work has completed.
    pub fn wait_idle(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| SheenError::BufferMapFailed(e.to_string()))
    }

    #[inline]
    #[must_use]
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Whether the adapter allows every usage in `usage` on `format`.
    ///
    /// Downlevel backends (GL, WebGL) reject some float formats as render
    /// attachments; creating such a texture would trip wgpu's validation
    /// handler instead of returning an error.
    #[must_use]
    pub fn supports_format(
        &self,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> bool {
        self.adapter
            .get_texture_format_features(format)
            .allowed_usages
            .contains(usage)
    }
}
