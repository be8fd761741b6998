//! Shader templates and full-screen render programs.

pub mod fullscreen;
pub mod shader_manager;

pub use fullscreen::{FullscreenProgram, ProgramDesc};
pub use shader_manager::{ShaderDefines, ShaderLibrary};
