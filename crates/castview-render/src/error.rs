//! Error types for the render module.

use castview_capture::PixelFormat;
use castview_gpu::GpuError;
use thiserror::Error;

use crate::target::RendererId;

/// Errors that can occur while rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// GPU operation failed.
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Renderer not registered with the control.
    #[error("Renderer {0} not found")]
    RendererNotFound(RendererId),

    /// Renderer already registered with the control.
    #[error("Renderer {0} already registered")]
    AlreadyRegistered(RendererId),

    /// Render loop already running.
    #[error("Render loop already running")]
    AlreadyRunning,

    /// Pixel data shorter than the frame geometry requires.
    #[error("Pixel data too short: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },

    /// Frame geometry that cannot be drawn in this format.
    #[error("Cannot draw {width}x{height} {format} frame")]
    InvalidFrameSize {
        width: u32,
        height: u32,
        format: PixelFormat,
    },

    /// No shader path for this pixel format.
    #[error("Unsupported texture format: {0}")]
    UnsupportedFormat(PixelFormat),

    /// Presenting to the window surface failed.
    #[error("Failed to present to window surface")]
    PresentFailed,

    /// Render thread could not be spawned.
    #[error("Failed to spawn render thread: {0}")]
    Thread(#[from] std::io::Error),
}
