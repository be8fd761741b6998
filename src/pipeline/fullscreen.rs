//! Full-Screen Programs
//!
//! A [`FullscreenProgram`] is a render pipeline that draws one triangle
//! covering its target and writes every color attachment of a
//! [`Framebuffer`]. All passes in the finalization stage are built on it.
//!
//! Bind group 0 layout:
//!
//! | Binding | Resource                          |
//! |---------|-----------------------------------|
//! | 0       | Linear clamp sampler              |
//! | 1       | Uniform buffer (pass parameters)  |
//! | 2 + i   | Input texture `i`                 |

use crate::errors::{Result, SheenError};
use crate::gpu::{Framebuffer, GpuContext, Texture2D};
use crate::pipeline::{ShaderDefines, ShaderLibrary};

/// Uniform buffers are never smaller than one 16-byte row.
const MIN_UNIFORM_SIZE: u64 = 16;

/// Construction parameters for a [`FullscreenProgram`].
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub template: &'a str,
    pub defines: ShaderDefines,
    /// Number of sampled input textures.
    pub input_count: usize,
    /// One color target per output attachment.
    pub targets: &'a [wgpu::TextureFormat],
    pub uniform_size: u64,
}

pub struct FullscreenProgram {
    label: String,
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniforms: wgpu::Buffer,
    input_count: usize,
    target_formats: Vec<wgpu::TextureFormat>,
}

impl FullscreenProgram {
    pub fn new(ctx: &GpuContext, library: &mut ShaderLibrary, desc: &ProgramDesc<'_>) -> Result<Self> {
        let device = &ctx.device;
        let shader = library.get_or_compile(device, desc.template, &desc.defines)?;

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ];
        entries.extend((0..desc.input_count).map(|i| wgpu::BindGroupLayoutEntry {
            binding: 2 + i as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }));

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} Layout", desc.label)),
            entries: &entries,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", desc.label)),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} Uniforms", desc.label)),
            size: desc.uniform_size.max(MIN_UNIFORM_SIZE).next_multiple_of(16),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let targets: Vec<_> = desc
            .targets
            .iter()
            .map(|&format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{} Pipeline", desc.label)),
            layout: Some(
                &device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(&format!("{} Pipeline Layout", desc.label)),
                    bind_group_layouts: &[Some(&layout)],
                    immediate_size: 0,
                }),
            ),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!(
            "Built program '{}' ({} inputs, {} targets)",
            desc.label,
            desc.input_count,
            desc.targets.len()
        );

        Ok(Self {
            label: desc.label.to_string(),
            pipeline,
            layout,
            sampler,
            uniforms,
            input_count: desc.input_count,
            target_formats: desc.targets.to_vec(),
        })
    }

    /// Uploads pass parameters to the uniform buffer.
    pub fn write_uniforms<T: bytemuck::Pod>(&self, ctx: &GpuContext, value: &T) {
        ctx.queue
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(value));
    }

    /// Creates a bind group for exactly `input_count` textures.
    pub fn bind(&self, device: &wgpu::Device, inputs: &[&Texture2D]) -> Result<wgpu::BindGroup> {
        if inputs.len() != self.input_count {
            return Err(SheenError::AttachmentMismatch {
                expected: self.input_count,
                actual: inputs.len(),
            });
        }

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: self.uniforms.as_entire_binding(),
            },
        ];
        entries.extend(inputs.iter().enumerate().map(|(i, texture)| wgpu::BindGroupEntry {
            binding: 2 + i as u32,
            resource: wgpu::BindingResource::TextureView(texture.view()),
        }));

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", self.label)),
            layout: &self.layout,
            entries: &entries,
        }))
    }

    /// Records one full-screen draw into `target`.
    ///
    /// `clear` of `None` keeps the current attachment contents.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        target: &Framebuffer,
        clear: Option<wgpu::Color>,
    ) -> Result<()> {
        let formats_match = target.attachments().len() == self.target_formats.len()
            && target
                .attachments()
                .iter()
                .zip(&self.target_formats)
                .all(|(texture, &format)| texture.format() == format);
        if !formats_match {
            return Err(SheenError::AttachmentMismatch {
                expected: self.target_formats.len(),
                actual: target.attachments().len(),
            });
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &target.color_attachments(clear),
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    /// Binds `inputs`, draws into `target` and submits.
    pub fn draw(
        &self,
        ctx: &GpuContext,
        inputs: &[&Texture2D],
        target: &Framebuffer,
        clear: Option<wgpu::Color>,
    ) -> Result<()> {
        let bind_group = self.bind(&ctx.device, inputs)?;
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&self.label),
            });
        self.encode(&mut encoder, &bind_group, target, clear)?;
        ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.input_count
    }

    #[inline]
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.target_formats.len()
    }
}
