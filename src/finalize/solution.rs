//! The finalized solution: diffuse/normal/constant plus albedo/ORM.

use std::path::Path;
use std::sync::Arc;

use crate::errors::Result;
use crate::finalize::prior::{CONSTANT_FILE, DIFFUSE_FILE, NORMAL_FILE, PriorSolutionImages};
use crate::finalize::{AlbedoOrmOptimization, BasisFitResources, FinalDiffuseOptimization, SaveReport};
use crate::gpu::{GpuContext, Texture2D};
use crate::pipeline::ShaderLibrary;
use crate::settings::FinalizeSettings;

enum DiffuseMaps {
    /// Estimated from a basis fit.
    Optimized(FinalDiffuseOptimization),
    /// Read from a saved solution.
    Loaded {
        diffuse: Texture2D,
        normal: Texture2D,
        constant: Option<Texture2D>,
    },
}

/// Owns every output map of the finalization stage.
///
/// Built fresh with [`FinalSolution::create`] or from a saved directory with
/// [`FinalSolution::load_from_prior_solution`]; both expose the same maps.
pub struct FinalSolution {
    ctx: Arc<GpuContext>,
    diffuse: DiffuseMaps,
    albedo_orm: AlbedoOrmOptimization,
}

impl FinalSolution {
    pub fn create(
        ctx: Arc<GpuContext>,
        library: &mut ShaderLibrary,
        settings: &FinalizeSettings,
        occlusion_map: Option<Arc<Texture2D>>,
    ) -> Result<Self> {
        let diffuse = FinalDiffuseOptimization::new(ctx.clone(), library, settings)?;
        let albedo_orm =
            AlbedoOrmOptimization::create(ctx.clone(), library, settings.resolution, occlusion_map)?;

        log::debug!(
            "Final solution allocated at {}x{}",
            settings.resolution.width,
            settings.resolution.height
        );

        Ok(Self {
            ctx,
            diffuse: DiffuseMaps::Optimized(diffuse),
            albedo_orm,
        })
    }

    /// Loads a solution saved by [`save_textures`](Self::save_textures).
    pub fn load_from_prior_solution(
        ctx: Arc<GpuContext>,
        library: &mut ShaderLibrary,
        dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let images = PriorSolutionImages::load(dir)?;

        let diffuse = Texture2D::from_rgba8(&ctx, DIFFUSE_FILE, &images.diffuse)?;
        let normal = Texture2D::from_rgba8(&ctx, NORMAL_FILE, &images.normal)?;
        let constant = images
            .constant
            .as_ref()
            .map(|image| Texture2D::from_rgba8(&ctx, CONSTANT_FILE, image))
            .transpose()?;

        let albedo_orm = AlbedoOrmOptimization::load_from_prior_solution(
            ctx.clone(),
            library,
            &images.albedo,
            images.orm.as_ref(),
        )?;

        Ok(Self {
            ctx,
            diffuse: DiffuseMaps::Loaded {
                diffuse,
                normal,
                constant,
            },
            albedo_orm,
        })
    }

    /// Runs the diffuse pass (fresh solutions only) and the albedo/ORM pass.
    pub fn execute(&mut self, fit: &BasisFitResources) -> Result<()> {
        if let DiffuseMaps::Optimized(diffuse) = &mut self.diffuse {
            diffuse.execute(fit)?;
        }
        self.albedo_orm.execute(fit)
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.diffuse, DiffuseMaps::Loaded { .. })
    }

    #[must_use]
    pub fn diffuse_map(&self) -> &Texture2D {
        match &self.diffuse {
            DiffuseMaps::Optimized(optimized) => optimized.diffuse_map(),
            DiffuseMaps::Loaded { diffuse, .. } => diffuse,
        }
    }

    #[must_use]
    pub fn normal_map(&self) -> &Texture2D {
        match &self.diffuse {
            DiffuseMaps::Optimized(optimized) => optimized.normal_map(),
            DiffuseMaps::Loaded { normal, .. } => normal,
        }
    }

    #[must_use]
    pub fn constant_map(&self) -> Option<&Texture2D> {
        match &self.diffuse {
            DiffuseMaps::Optimized(optimized) => optimized.constant_map(),
            DiffuseMaps::Loaded { constant, .. } => constant.as_ref(),
        }
    }

    #[must_use]
    pub fn albedo_map(&self) -> &Texture2D {
        self.albedo_orm.albedo_map()
    }

    #[must_use]
    pub fn orm_map(&self) -> &Texture2D {
        self.albedo_orm.orm_map()
    }

    #[must_use]
    pub fn diffuse_optimization(&self) -> Option<&FinalDiffuseOptimization> {
        match &self.diffuse {
            DiffuseMaps::Optimized(optimized) => Some(optimized),
            DiffuseMaps::Loaded { .. } => None,
        }
    }

    pub fn diffuse_optimization_mut(&mut self) -> Option<&mut FinalDiffuseOptimization> {
        match &mut self.diffuse {
            DiffuseMaps::Optimized(optimized) => Some(optimized),
            DiffuseMaps::Loaded { .. } => None,
        }
    }

    /// Writes every map into `dir`. Failures are logged and reported, never
    /// returned; the in-memory maps are unaffected.
    pub fn save_textures(&self, dir: impl AsRef<Path>) -> SaveReport {
        let dir = dir.as_ref();
        if let Err(err) = std::fs::create_dir_all(dir) {
            log::error!("Cannot create {}: {err}", dir.display());
        }

        let mut report = match &self.diffuse {
            DiffuseMaps::Optimized(optimized) => optimized.save_textures(dir),
            DiffuseMaps::Loaded {
                diffuse,
                normal,
                constant,
            } => {
                let mut report = SaveReport::default();
                report.save(&self.ctx, diffuse, dir, DIFFUSE_FILE);
                report.save(&self.ctx, normal, dir, NORMAL_FILE);
                if let Some(constant) = constant {
                    report.save(&self.ctx, constant, dir, CONSTANT_FILE);
                }
                report
            }
        };
        report.merge(self.albedo_orm.save_textures(dir));

        if report.is_complete() {
            log::info!("Textures saved to {}", dir.display());
        } else {
            log::warn!(
                "{} of {} texture(s) could not be saved to {}",
                report.failed.len(),
                report.failed.len() + report.written.len(),
                dir.display()
            );
        }
        report
    }
}
