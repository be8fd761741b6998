//! Finalization Stage
//!
//! Turns the upstream basis fit into the dense output maps:
//!
//! ```text
//!   BasisFitResources ──► FinalDiffuseOptimization ──► diffuse / normal / constant
//!          │                      │
//!          │                      └─ hole fill (ping-pong, best effort)
//!          │
//!          └────────────► AlbedoOrmOptimization ────► albedo / ORM
//! ```
//!
//! [`FinalSolution`] owns both passes. It can also be rebuilt from a
//! directory of previously saved maps, skipping the diffuse pass.

pub mod albedo_orm;
pub mod basis;
pub mod diffuse;
pub mod hole_fill;
pub mod prior;
pub mod solution;

use std::path::{Path, PathBuf};

pub use albedo_orm::AlbedoOrmOptimization;
pub use basis::BasisFitResources;
pub use diffuse::FinalDiffuseOptimization;
pub use hole_fill::{
    CpuHoleFill, FillOutcome, HoleFill, ShaderHoleFill, Side, adopt_filled, fill_holes_cpu,
};
pub use prior::PriorSolutionImages;
pub use solution::FinalSolution;

use crate::errors::SheenError;
use crate::gpu::{GpuContext, Texture2D};

/// Outcome of persisting a set of maps. Failures are logged, not returned.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, SheenError)>,
}

impl SaveReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: SaveReport) {
        self.written.extend(other.written);
        self.failed.extend(other.failed);
    }

    /// Writes `texture` to `dir/file_name`, recording the outcome.
    pub(crate) fn save(&mut self, ctx: &GpuContext, texture: &Texture2D, dir: &Path, file_name: &str) {
        let path = dir.join(file_name);
        match texture.save_png(ctx, &path) {
            Ok(()) => self.written.push(path),
            Err(err) => {
                log::error!("Failed to save {}: {err}", path.display());
                self.failed.push((path, err));
            }
        }
    }
}
