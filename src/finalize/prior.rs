//! Previously saved solutions.
//!
//! A finalized solution is persisted as PNG files under fixed names. This
//! module decodes such a directory; [`FinalSolution`](super::FinalSolution)
//! turns the images into textures.

use std::path::Path;

use image::RgbaImage;

use crate::errors::{Result, SheenError};

pub const DIFFUSE_FILE: &str = "diffuse.png";
pub const NORMAL_FILE: &str = "normal.png";
pub const CONSTANT_FILE: &str = "constant.png";
pub const ALBEDO_FILE: &str = "albedo.png";
pub const ORM_FILE: &str = "orm.png";

/// Decoded maps of a saved solution.
#[derive(Debug, Clone)]
pub struct PriorSolutionImages {
    pub diffuse: RgbaImage,
    pub normal: RgbaImage,
    pub albedo: RgbaImage,
    /// Absent when the solution had no constant term.
    pub constant: Option<RgbaImage>,
    /// Absent when the solution had no ORM map.
    pub orm: Option<RgbaImage>,
}

impl PriorSolutionImages {
    /// Decodes the maps in `dir`.
    ///
    /// `diffuse.png`, `normal.png` and `albedo.png` are required; a missing
    /// one is [`SheenError::MissingSolutionFile`]. `constant.png` and
    /// `orm.png` are optional.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let images = Self {
            diffuse: load_required(dir, DIFFUSE_FILE)?,
            normal: load_required(dir, NORMAL_FILE)?,
            albedo: load_required(dir, ALBEDO_FILE)?,
            constant: load_optional(dir, CONSTANT_FILE)?,
            orm: load_optional(dir, ORM_FILE)?,
        };
        log::info!("Prior solution loaded from {}", dir.display());
        Ok(images)
    }
}

fn load_required(dir: &Path, file_name: &str) -> Result<RgbaImage> {
    load_optional(dir, file_name)?.ok_or_else(|| SheenError::MissingSolutionFile(dir.join(file_name)))
}

/// `Ok(None)` when the file does not exist; decode failures are errors.
fn load_optional(dir: &Path, file_name: &str) -> Result<Option<RgbaImage>> {
    let path = dir.join(file_name);
    if !path.is_file() {
        log::debug!("{} not present", path.display());
        return Ok(None);
    }
    Ok(Some(image::open(&path)?.to_rgba8()))
}
