//! Handles and texture attribute descriptions.

use std::fmt;

/// Driver error code for an out-of-range value.
pub const ERROR_INVALID_VALUE: u32 = 0x0501;

/// Driver error code for an operation illegal in the current state.
pub const ERROR_INVALID_OPERATION: u32 = 0x0502;

/// Opaque native window handle supplied by the windowing toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeWindow(pub u64);

impl fmt::Display for NativeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Drawing surface owned by a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// GPU texture name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Linked shader program name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Pixel transfer buffer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Attribute or uniform location within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location(pub i32);

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

/// Texture coordinate wrap mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

/// Texel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    Rgba,
    Luminance,
    Alpha,
    LuminanceAlpha,
}

impl TexelFormat {
    /// Number of components per texel.
    pub fn components(self) -> usize {
        match self {
            Self::Rgba => 4,
            Self::Luminance | Self::Alpha => 1,
            Self::LuminanceAlpha => 2,
        }
    }
}

/// Component storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    UnsignedByte,
    UnsignedShort,
}

impl PixelType {
    pub fn size(self) -> usize {
        match self {
            Self::UnsignedByte => 1,
            Self::UnsignedShort => 2,
        }
    }
}

/// Texture binding target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2D,
    External,
}

/// Everything that decides whether two textures of the same size are
/// interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureAttributes {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
    pub internal_format: TexelFormat,
    pub format: TexelFormat,
    pub pixel_type: PixelType,
    pub target: TextureTarget,
}

impl Default for TextureAttributes {
    fn default() -> Self {
        Self {
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            wrap_s: TextureWrap::ClampToEdge,
            wrap_t: TextureWrap::ClampToEdge,
            internal_format: TexelFormat::Rgba,
            format: TexelFormat::Rgba,
            pixel_type: PixelType::UnsignedByte,
            target: TextureTarget::Texture2D,
        }
    }
}

impl TextureAttributes {
    /// Default sampling with the given texel layout.
    pub fn with_format(format: TexelFormat) -> Self {
        Self {
            internal_format: format,
            format,
            ..Self::default()
        }
    }

    /// Bytes per texel of uploaded data.
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.components() * self.pixel_type.size()
    }

    /// Stable string identifying these attributes.
    ///
    /// Equal attributes always give equal keys and distinct attributes give
    /// distinct keys.
    pub fn hash_key(&self) -> String {
        let filter = |f: TextureFilter| match f {
            TextureFilter::Nearest => 'n',
            TextureFilter::Linear => 'l',
        };
        let wrap = |w: TextureWrap| match w {
            TextureWrap::ClampToEdge => 'c',
            TextureWrap::Repeat => 'r',
            TextureWrap::MirroredRepeat => 'm',
        };
        let texel = |t: TexelFormat| match t {
            TexelFormat::Rgba => "rgba",
            TexelFormat::Luminance => "l",
            TexelFormat::Alpha => "a",
            TexelFormat::LuminanceAlpha => "la",
        };
        let pixel_type = match self.pixel_type {
            PixelType::UnsignedByte => "u8",
            PixelType::UnsignedShort => "u16",
        };
        let target = match self.target {
            TextureTarget::Texture2D => "2d",
            TextureTarget::External => "ext",
        };

        format!(
            "{}{}{}{}.{}.{}.{}.{}",
            filter(self.min_filter),
            filter(self.mag_filter),
            wrap(self.wrap_s),
            wrap(self.wrap_t),
            texel(self.internal_format),
            texel(self.format),
            pixel_type,
            target,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(TextureAttributes::with_format(TexelFormat::Rgba).bytes_per_pixel(), 4);
        assert_eq!(TextureAttributes::with_format(TexelFormat::Alpha).bytes_per_pixel(), 1);
        assert_eq!(TextureAttributes::with_format(TexelFormat::Luminance).bytes_per_pixel(), 1);
        assert_eq!(
            TextureAttributes::with_format(TexelFormat::LuminanceAlpha).bytes_per_pixel(),
            2
        );

        let wide = TextureAttributes {
            pixel_type: PixelType::UnsignedShort,
            ..TextureAttributes::default()
        };
        assert_eq!(wide.bytes_per_pixel(), 8);
    }

    #[test]
    fn test_hash_key_is_deterministic() {
        let a = TextureAttributes::default();
        assert_eq!(a.hash_key(), TextureAttributes::default().hash_key());
        assert_eq!(a.hash_key(), "llcc.rgba.rgba.u8.2d");
    }

    #[test]
    fn test_hash_key_distinguishes_every_field() {
        let base = TextureAttributes::default();
        let variants = [
            TextureAttributes { min_filter: TextureFilter::Nearest, ..base },
            TextureAttributes { mag_filter: TextureFilter::Nearest, ..base },
            TextureAttributes { wrap_s: TextureWrap::Repeat, ..base },
            TextureAttributes { wrap_t: TextureWrap::MirroredRepeat, ..base },
            TextureAttributes { internal_format: TexelFormat::Luminance, ..base },
            TextureAttributes { format: TexelFormat::Alpha, ..base },
            TextureAttributes { pixel_type: PixelType::UnsignedShort, ..base },
            TextureAttributes { target: TextureTarget::External, ..base },
        ];

        let mut keys: Vec<String> = variants.iter().map(|v| v.hash_key()).collect();
        keys.push(base.hash_key());
        let count = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), count);
    }
}
