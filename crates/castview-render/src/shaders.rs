//! Shader sources for the output quad.

use castview_capture::PixelFormat;

/// Vertex attribute carrying quad positions.
pub const ATTR_MODEL_COORDS: &str = "model_coords";

/// Vertex attribute carrying texture coordinates.
pub const ATTR_TEX_COORDS: &str = "tex_coords";

/// Texture coordinates for the packed chroma plane. Its padded width differs
/// from the luminance plane's.
pub const ATTR_UV_TEX_COORDS: &str = "uv_tex_coords";

/// Projection uniform.
pub const UNIFORM_MVP: &str = "mvp_matrix";

/// Primary sampler, texture unit 0.
pub const UNIFORM_COLOR_MAP: &str = "color_map";

/// Packed chroma sampler for two-plane formats, texture unit 1.
pub const UNIFORM_UV_COLOR_MAP: &str = "uv_color_map";

const VERTEX: &str = "\
attribute vec4 model_coords;
attribute vec2 tex_coords;
attribute vec2 uv_tex_coords;
uniform mat4 mvp_matrix;
varying vec2 v_tex_coords;
varying vec2 v_uv_tex_coords;

void main() {
    gl_Position = mvp_matrix * model_coords;
    v_tex_coords = tex_coords;
    v_uv_tex_coords = uv_tex_coords;
}
";

const FRAGMENT_RGBA: &str = "\
precision mediump float;
varying vec2 v_tex_coords;
uniform sampler2D color_map;

void main() {
    gl_FragColor = texture2D(color_map, v_tex_coords);
}
";

// Luminance-alpha carries Y in .r; the RGBA plane carries Y0 U Y1 V.
const FRAGMENT_YUYV: &str = "\
precision mediump float;
varying vec2 v_tex_coords;
varying vec2 v_uv_tex_coords;
uniform sampler2D color_map;
uniform sampler2D uv_color_map;

void main() {
    float y = texture2D(color_map, v_tex_coords).r;
    vec4 packed = texture2D(uv_color_map, v_uv_tex_coords);
    float u = packed.g - 0.5;
    float v = packed.a - 0.5;
    gl_FragColor = vec4(
        y + 1.402 * v,
        y - 0.344 * u - 0.714 * v,
        y + 1.772 * u,
        1.0);
}
";

/// Vertex and fragment sources, one fragment shader per texture layout.
#[derive(Debug, Clone)]
pub struct ShaderSet {
    pub vertex: String,
    pub rgba_fragment: String,
    pub yuyv_fragment: String,
}

impl Default for ShaderSet {
    fn default() -> Self {
        Self {
            vertex: VERTEX.to_string(),
            rgba_fragment: FRAGMENT_RGBA.to_string(),
            yuyv_fragment: FRAGMENT_YUYV.to_string(),
        }
    }
}

impl ShaderSet {
    /// Fragment source for `format`, if it can be drawn.
    pub fn fragment_for(&self, format: PixelFormat) -> Option<&str> {
        match format {
            PixelFormat::Rgba => Some(&self.rgba_fragment),
            PixelFormat::Yuyv => Some(&self.yuyv_fragment),
            PixelFormat::Rgb | PixelFormat::I420 | PixelFormat::Nv21 => None,
        }
    }
}
