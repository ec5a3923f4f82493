//! Rendering of captured frames into native windows.
//!
//! A [`RenderControl`] owns the GPU context on a dedicated thread and drives
//! every registered [`RenderTarget`] through setup, draw and release. The
//! built-in [`Renderer`] draws one textured quad per window from frames
//! handed in by producer threads, fetching its textures from a
//! [`ResourceCache`] shared by all renderers.

mod cache;
mod config;
mod control;
mod error;
mod events;
mod metrics;
mod projection;
mod renderer;
mod shaders;
mod state;
mod target;
mod texture;

pub use cache::{cache_key, AttributeKey, Cacheable, ResourceCache};
pub use config::{interval_us, RenderConfig, MIN_FPS};
pub use control::RenderControl;
pub use error::RenderError;
pub use events::RenderEvent;
pub use metrics::{RenderMetrics, RenderStats};
pub use projection::{aspect_fit_projection, ScaleType, IDENTITY};
pub use renderer::Renderer;
pub use shaders::{
    ShaderSet, ATTR_MODEL_COORDS, ATTR_TEX_COORDS, ATTR_UV_TEX_COORDS, UNIFORM_COLOR_MAP,
    UNIFORM_MVP, UNIFORM_UV_COLOR_MAP,
};
pub use state::RenderState;
pub use target::{DrawOutcome, FrameContext, RenderTarget, RendererId};
pub use texture::{Texture, TextureHandle};

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
