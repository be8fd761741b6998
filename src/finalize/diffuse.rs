//! Diffuse / normal estimation followed by hole filling.

use std::path::Path;
use std::sync::Arc;

use crate::errors::Result;
use crate::finalize::hole_fill::{CpuHoleFill, FillOutcome, HoleFill, ShaderHoleFill, adopt_filled};
use crate::finalize::prior::{CONSTANT_FILE, DIFFUSE_FILE, NORMAL_FILE};
use crate::finalize::{BasisFitResources, SaveReport};
use crate::gpu::{Framebuffer, FramebufferBuilder, GpuContext, Texture2D};
use crate::pipeline::{FullscreenProgram, ProgramDesc, ShaderDefines, ShaderLibrary};
use crate::settings::{FinalizeSettings, TextureResolution};

const DIFFUSE_ATTACHMENT: usize = 0;
const NORMAL_ATTACHMENT: usize = 1;
const CONSTANT_ATTACHMENT: usize = 2;

const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

type BoxedHoleFill = Box<dyn HoleFill<Framebuffer>>;

pub struct FinalDiffuseOptimization {
    ctx: Arc<GpuContext>,
    program: FullscreenProgram,
    hole_fill: Option<BoxedHoleFill>,
    resolution: TextureResolution,
    include_constant: bool,
    framebuffer: Framebuffer,
    /// Bound in place of a missing constant estimate.
    black: Texture2D,
}

impl FinalDiffuseOptimization {
    pub fn new(
        ctx: Arc<GpuContext>,
        library: &mut ShaderLibrary,
        settings: &FinalizeSettings,
    ) -> Result<Self> {
        let include_constant = settings.include_constant;
        let attachment_count = if include_constant { 3 } else { 2 };
        let formats = vec![OUTPUT_FORMAT; attachment_count];

        let program = FullscreenProgram::new(
            &ctx,
            library,
            &ProgramDesc {
                label: "Diffuse Estimation",
                template: "estimate_diffuse",
                defines: ShaderDefines::new().define("CONSTANT_TEXTURE_ENABLED", include_constant),
                input_count: attachment_count,
                targets: &formats,
                uniform_size: 0,
            },
        )?;

        let resolution = settings.resolution;
        let framebuffer = Self::build_target(&ctx, resolution, attachment_count, "Diffuse Front")?;

        let hole_fill: Option<BoxedHoleFill> = if settings.hole_fill.enabled {
            let iterations = settings.hole_fill.iterations_for(resolution);
            let min_fill_alpha = settings.hole_fill.min_fill_alpha;
            match ShaderHoleFill::new(&ctx, library, &formats, iterations, min_fill_alpha) {
                Ok(op) => Some(Box::new(op)),
                Err(err) => {
                    log::warn!("GPU hole fill unavailable, falling back to CPU: {err}");
                    Some(Box::new(CpuHoleFill {
                        iterations,
                        min_fill_alpha,
                    }))
                }
            }
        } else {
            None
        };

        let black = Texture2D::solid(&ctx, "Diffuse Black", [0, 0, 0, 0])?;

        Ok(Self {
            ctx,
            program,
            hole_fill,
            resolution,
            include_constant,
            framebuffer,
            black,
        })
    }

    fn build_target(
        ctx: &Arc<GpuContext>,
        resolution: TextureResolution,
        attachment_count: usize,
        label: &str,
    ) -> Result<Framebuffer> {
        FramebufferBuilder::new(ctx.clone(), resolution.width, resolution.height)
            .label(label)
            .add_color_attachments(OUTPUT_FORMAT, attachment_count)
            .build()
    }

    /// Estimates diffuse and normal (and constant) maps, then fills holes
    /// with the configured operator.
    pub fn execute(&mut self, fit: &BasisFitResources) -> Result<()> {
        self.estimate(fit)?;
        if let Some(mut op) = self.hole_fill.take() {
            self.fill_holes_with(op.as_mut());
            self.hole_fill = Some(op);
        }
        Ok(())
    }

    /// Like [`execute`](Self::execute) with a caller-supplied fill operator.
    pub fn execute_with<H>(&mut self, fit: &BasisFitResources, op: &mut H) -> Result<FillOutcome>
    where
        H: HoleFill<Framebuffer> + ?Sized,
    {
        self.estimate(fit)?;
        Ok(self.fill_holes_with(op))
    }

    fn estimate(&mut self, fit: &BasisFitResources) -> Result<()> {
        let mut inputs: Vec<&Texture2D> = vec![&*fit.diffuse, &*fit.normal];
        if self.include_constant {
            match fit.constant.as_deref() {
                Some(constant) => inputs.push(constant),
                None => {
                    log::warn!("Constant map requested but the basis fit has none");
                    inputs.push(&self.black);
                }
            }
        }

        self.program
            .draw(&self.ctx, &inputs, &self.framebuffer, Some(wgpu::Color::TRANSPARENT))?;
        log::debug!(
            "Diffuse estimated at {}x{}",
            self.resolution.width,
            self.resolution.height
        );
        Ok(())
    }

    /// Fills holes in the current maps. Never fails: if the back target
    /// cannot be created or the operator errors, the unfilled maps stay.
    pub fn fill_holes_with<H>(&mut self, op: &mut H) -> FillOutcome
    where
        H: HoleFill<Framebuffer> + ?Sized,
    {
        let back = match Self::build_target(
            &self.ctx,
            self.resolution,
            self.framebuffer.attachments().len(),
            "Diffuse Back",
        ) {
            Ok(back) => back,
            Err(err) => {
                log::warn!("Skipping hole fill, no back buffer: {err}");
                return FillOutcome::Failed;
            }
        };

        let outcome = adopt_filled(&mut self.framebuffer, back, op);
        log::debug!("Hole fill outcome: {outcome:?}");
        outcome
    }

    #[must_use]
    pub fn diffuse_map(&self) -> &Texture2D {
        self.framebuffer.attachment(DIFFUSE_ATTACHMENT)
    }

    #[must_use]
    pub fn normal_map(&self) -> &Texture2D {
        self.framebuffer.attachment(NORMAL_ATTACHMENT)
    }

    #[must_use]
    pub fn constant_map(&self) -> Option<&Texture2D> {
        self.include_constant
            .then(|| self.framebuffer.attachment(CONSTANT_ATTACHMENT))
    }

    #[inline]
    #[must_use]
    pub fn includes_constant_map(&self) -> bool {
        self.include_constant
    }

    #[inline]
    #[must_use]
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn save_textures(&self, dir: &Path) -> SaveReport {
        let mut report = SaveReport::default();
        report.save(&self.ctx, self.diffuse_map(), dir, DIFFUSE_FILE);
        report.save(&self.ctx, self.normal_map(), dir, NORMAL_FILE);
        if let Some(constant) = self.constant_map() {
            report.save(&self.ctx, constant, dir, CONSTANT_FILE);
        }
        report
    }
}
