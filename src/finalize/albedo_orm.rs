//! Albedo / ORM estimation.
//!
//! One full-screen pass combines the basis-fit estimates into an overall
//! albedo map and a packed occlusion-roughness-metalness map.

use std::path::Path;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;

use crate::errors::Result;
use crate::finalize::{BasisFitResources, SaveReport};
use crate::finalize::prior::{ALBEDO_FILE, ORM_FILE};
use crate::gpu::{Framebuffer, FramebufferBuilder, GpuContext, Texture2D};
use crate::pipeline::{FullscreenProgram, ProgramDesc, ShaderDefines, ShaderLibrary};
use crate::settings::TextureResolution;

const ALBEDO_ATTACHMENT: usize = 0;
const ORM_ATTACHMENT: usize = 1;

const OUTPUT_FORMATS: [wgpu::TextureFormat; 2] = [
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Rgba8Unorm,
];

/// Full occlusion visibility, full roughness, no metal.
const NEUTRAL_ORM: wgpu::Color = wgpu::Color {
    r: 1.0,
    g: 1.0,
    b: 0.0,
    a: 1.0,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct AlbedoOrmParams {
    constant_enabled: u32,
    _padding: [u32; 3],
}

pub struct AlbedoOrmOptimization {
    ctx: Arc<GpuContext>,
    program: FullscreenProgram,
    framebuffer: Framebuffer,
    occlusion_map: Option<Arc<Texture2D>>,
    /// Bound in place of a missing constant term.
    black: Texture2D,
}

impl AlbedoOrmOptimization {
    /// Allocates the pass at `resolution`. When `occlusion_map` is given it
    /// becomes the O channel of the ORM output.
    pub fn create(
        ctx: Arc<GpuContext>,
        library: &mut ShaderLibrary,
        resolution: TextureResolution,
        occlusion_map: Option<Arc<Texture2D>>,
    ) -> Result<Self> {
        let occlusion_enabled = occlusion_map.is_some();
        let program = FullscreenProgram::new(
            &ctx,
            library,
            &ProgramDesc {
                label: "Albedo ORM Estimation",
                template: "estimate_albedo_orm",
                defines: ShaderDefines::new().define("OCCLUSION_TEXTURE_ENABLED", occlusion_enabled),
                input_count: if occlusion_enabled { 5 } else { 4 },
                targets: &OUTPUT_FORMATS,
                uniform_size: std::mem::size_of::<AlbedoOrmParams>() as u64,
            },
        )?;

        let framebuffer = FramebufferBuilder::new(ctx.clone(), resolution.width, resolution.height)
            .label("Albedo ORM")
            .add_color_attachment(OUTPUT_FORMATS[ALBEDO_ATTACHMENT])
            .add_color_attachment(OUTPUT_FORMATS[ORM_ATTACHMENT])
            .build()?;

        let black = Texture2D::solid(&ctx, "Albedo ORM Black", [0, 0, 0, 0])?;

        Ok(Self {
            ctx,
            program,
            framebuffer,
            occlusion_map,
            black,
        })
    }

    /// Rebuilds the pass from saved maps. `orm` also serves as the occlusion
    /// source for later executions; without it the ORM output is neutral.
    pub fn load_from_prior_solution(
        ctx: Arc<GpuContext>,
        library: &mut ShaderLibrary,
        albedo: &RgbaImage,
        orm: Option<&RgbaImage>,
    ) -> Result<Self> {
        let resolution = TextureResolution::new(albedo.width(), albedo.height());
        let occlusion_map = orm
            .map(|orm| Texture2D::from_rgba8(&ctx, "Prior ORM", orm).map(Arc::new))
            .transpose()?;

        let optimization = Self::create(ctx, library, resolution, occlusion_map)?;
        optimization
            .framebuffer
            .upload_rgba8(ALBEDO_ATTACHMENT, albedo)?;
        match orm {
            Some(orm) => optimization.framebuffer.upload_rgba8(ORM_ATTACHMENT, orm)?,
            None => {
                log::warn!("No ORM map in prior solution, using neutral occlusion and roughness");
                optimization
                    .framebuffer
                    .clear_color_buffer(ORM_ATTACHMENT, NEUTRAL_ORM)?;
            }
        }
        Ok(optimization)
    }

    /// Estimates albedo and ORM from the basis fit.
    pub fn execute(&mut self, fit: &BasisFitResources) -> Result<()> {
        if self.occlusion_map.is_none() && fit.occlusion.is_some() {
            log::warn!("Basis fit carries an occlusion map but this pass was built without one");
        }

        self.program.write_uniforms(
            &self.ctx,
            &AlbedoOrmParams {
                constant_enabled: u32::from(fit.constant.is_some()),
                _padding: [0; 3],
            },
        );

        let mut inputs: Vec<&Texture2D> = vec![
            &*fit.diffuse,
            &*fit.specular_reflectivity,
            &*fit.roughness,
            fit.constant.as_deref().unwrap_or(&self.black),
        ];
        if let Some(occlusion) = &self.occlusion_map {
            inputs.push(occlusion);
        }

        self.program
            .draw(&self.ctx, &inputs, &self.framebuffer, Some(wgpu::Color::TRANSPARENT))?;
        log::info!("Albedo / ORM estimated");
        Ok(())
    }

    #[must_use]
    pub fn albedo_map(&self) -> &Texture2D {
        self.framebuffer.attachment(ALBEDO_ATTACHMENT)
    }

    #[must_use]
    pub fn orm_map(&self) -> &Texture2D {
        self.framebuffer.attachment(ORM_ATTACHMENT)
    }

    pub fn save_textures(&self, dir: &Path) -> SaveReport {
        let mut report = SaveReport::default();
        report.save(&self.ctx, self.albedo_map(), dir, ALBEDO_FILE);
        report.save(&self.ctx, self.orm_map(), dir, ORM_FILE);
        report
    }
}
