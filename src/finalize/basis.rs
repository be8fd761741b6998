use std::sync::Arc;

use crate::gpu::Texture2D;

/// Textures produced by the upstream per-texel basis fit.
///
/// Read-only inputs to the finalization passes.
#[derive(Debug, Clone)]
pub struct BasisFitResources {
    pub diffuse: Arc<Texture2D>,
    /// Packed normal estimate, `n * 0.5 + 0.5`.
    pub normal: Arc<Texture2D>,
    pub specular_reflectivity: Arc<Texture2D>,
    pub roughness: Arc<Texture2D>,
    /// Constant / translucency term, when the fit estimated one.
    pub constant: Option<Arc<Texture2D>>,
    pub occlusion: Option<Arc<Texture2D>>,
}

impl BasisFitResources {
    #[must_use]
    pub fn new(
        diffuse: Arc<Texture2D>,
        normal: Arc<Texture2D>,
        specular_reflectivity: Arc<Texture2D>,
        roughness: Arc<Texture2D>,
    ) -> Self {
        Self {
            diffuse,
            normal,
            specular_reflectivity,
            roughness,
            constant: None,
            occlusion: None,
        }
    }

    #[must_use]
    pub fn with_constant(mut self, constant: Arc<Texture2D>) -> Self {
        self.constant = Some(constant);
        self
    }

    #[must_use]
    pub fn with_occlusion(mut self, occlusion: Arc<Texture2D>) -> Self {
        self.occlusion = Some(occlusion);
        self
    }
}
