//! Error types for the capture module.

use thiserror::Error;

/// Errors that can occur during capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device not found or no longer present.
    #[error("Capture device not found: {0}")]
    DeviceNotFound(String),

    /// Operation requires a bound device.
    #[error("No capture device bound")]
    NotBound,

    /// Capture already started.
    #[error("Capture already started")]
    AlreadyStarted,

    /// Capture not started.
    #[error("Capture not started")]
    NotStarted,

    /// Allocating capture resources failed.
    #[error("Capture resource allocation failed: {0}")]
    Allocation(String),

    /// Pixel format not handled by this source.
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    /// Device lost during capture.
    #[error("Capture device lost: {0}")]
    DeviceLost(String),

    /// Frame grabber thread could not be spawned.
    #[error("Failed to spawn grabber thread: {0}")]
    Thread(#[from] std::io::Error),
}
