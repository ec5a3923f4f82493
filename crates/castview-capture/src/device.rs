//! Device descriptions produced by enumeration.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Pixel layout of frames produced by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel.
    Rgba,

    /// 8-bit RGB, 3 bytes per pixel.
    Rgb,

    /// Planar YUV 4:2:0.
    I420,

    /// Semi-planar YUV 4:2:0 with interleaved VU.
    Nv21,

    /// Packed YUV 4:2:2 (Y0 U Y1 V), 2 bytes per pixel.
    Yuyv,
}

impl PixelFormat {
    /// Byte length of one frame of the given dimensions.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Rgba => pixels * 4,
            Self::Rgb => pixels * 3,
            // Y plane plus two quarter-size chroma planes
            Self::I420 | Self::Nv21 => pixels + pixels / 2,
            Self::Yuyv => pixels * 2,
        }
    }

    /// Returns the display name for this format.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rgba => "RGBA",
            Self::Rgb => "RGB",
            Self::I420 => "I420",
            Self::Nv21 => "NV21",
            Self::Yuyv => "YUYV",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of capturable device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// A monitor or whole screen.
    Screen,

    /// An application window.
    Window,

    /// The pointer image.
    Cursor,

    /// A video input device.
    Camera,

    /// A generated source with no OS backing.
    Synthetic,
}

/// Source-specific device identifier (window id, screen number, camera index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A capturable device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Source-specific identifier.
    pub id: DeviceId,

    /// Human-readable name.
    pub name: String,

    /// Kind of device.
    pub kind: DeviceKind,

    /// Pixel format of grabbed frames.
    pub format: PixelFormat,

    /// Position of the device's top-left corner in screen coordinates.
    pub x: i32,
    pub y: i32,

    /// Dimensions in pixels.
    pub width: u32,
    pub height: u32,

    /// Opaque backend data.
    pub extension: Option<Bytes>,
}

impl DeviceInfo {
    /// Create a device description at the origin with no extension data.
    pub fn new(
        id: DeviceId,
        name: impl Into<String>,
        kind: DeviceKind,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            format,
            x: 0,
            y: 0,
            width,
            height,
            extension: None,
        }
    }

    /// Set the screen position.
    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Expected byte length of one frame from this device.
    pub fn frame_len(&self) -> usize {
        self.format.frame_len(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len_per_format() {
        assert_eq!(PixelFormat::Rgba.frame_len(4, 2), 32);
        assert_eq!(PixelFormat::Rgb.frame_len(4, 2), 24);
        assert_eq!(PixelFormat::Yuyv.frame_len(4, 2), 16);
        assert_eq!(PixelFormat::I420.frame_len(4, 2), 12);
        assert_eq!(PixelFormat::Nv21.frame_len(4, 2), 12);
    }

    #[test]
    fn test_device_info_builder() {
        let info = DeviceInfo::new(
            DeviceId(7),
            "Display_0",
            DeviceKind::Screen,
            PixelFormat::Rgba,
            1920,
            1080,
        )
        .at(-1920, 0);

        assert_eq!(info.x, -1920);
        assert_eq!(info.frame_len(), 1920 * 1080 * 4);
        assert_eq!(info.id.to_string(), "7");
    }
}
