pub mod errors;
pub mod settings;
pub mod gpu;
pub mod pipeline;
pub mod stream;
pub mod views;
pub mod finalize;
pub mod evaluation;

pub use errors::{Result, SheenError};
pub use settings::{FinalizeSettings, GpuSettings, HoleFillSettings, StreamSettings, TextureResolution};
pub use gpu::{Framebuffer, FramebufferBuilder, GpuContext, Texture2D};
pub use pipeline::{ShaderDefines, ShaderLibrary};
pub use stream::{PixelBufferPool, RenderTarget, StreamMode, ViewFrame, ViewStream};
pub use views::{View, ViewSet, ViewUniforms};
pub use finalize::{BasisFitResources, FinalSolution, SaveReport};
