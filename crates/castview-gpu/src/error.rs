//! Error types for the GPU module.

use thiserror::Error;

use crate::types::{NativeWindow, SurfaceId};

/// Errors reported by a GPU context or device.
#[derive(Debug, Error)]
pub enum GpuError {
    /// Context creation failed.
    #[error("GPU context creation failed: {0}")]
    ContextCreation(String),

    /// Window surface creation failed.
    #[error("Failed to create surface for window {0}")]
    WindowSurface(NativeWindow),

    /// Offscreen surface creation failed.
    #[error("Failed to create {width}x{height} offscreen surface")]
    OffscreenSurface { width: u32, height: u32 },

    /// Surface could not be made current.
    #[error("Failed to make surface {0} current")]
    MakeCurrent(SurfaceId),

    /// Shader failed to compile.
    #[error("Shader compilation failed: {0}")]
    ShaderCompile(String),

    /// Program failed to link.
    #[error("Program link failed: {0}")]
    ProgramLink(String),

    /// A required attribute or uniform is missing from the program.
    #[error("Shader input not found: {0}")]
    MissingInput(String),

    /// Texture storage could not be allocated.
    #[error("Texture allocation failed for {width}x{height}")]
    TextureAllocation { width: u32, height: u32 },

    /// Pixel buffer could not be allocated.
    #[error("Pixel buffer allocation failed for {0} bytes")]
    BufferAllocation(usize),

    /// Error flag raised by the driver.
    #[error("GPU driver error 0x{code:04x}")]
    Driver { code: u32 },

    /// The context is no longer usable.
    #[error("GPU context lost")]
    ContextLost,
}
