//! What the render loop drives, and what it lends each target per tick.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use castview_gpu::{GpuContext, GpuDevice, NativeWindow, SurfaceId, TextureAttributes};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cache::{Cacheable, ResourceCache};
use crate::metrics::RenderMetrics;
use crate::texture::Texture;
use crate::RenderResult;

static NEXT_RENDERER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a render target within a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RendererId(pub u64);

impl RendererId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_RENDERER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RendererId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// A frame was presented.
    Presented,

    /// Nothing to do this tick.
    Skipped,
}

/// Something the render loop sets up, draws and releases.
///
/// All three methods run on the render thread while the control's table lock
/// is held; implementations must not call back into the control.
pub trait RenderTarget: Send + Sync {
    fn id(&self) -> RendererId;

    /// Acquire GPU resources. An error leaves the target to be retried on the
    /// next tick.
    fn setup(&self, ctx: &mut FrameContext<'_>) -> RenderResult<()>;

    /// Draw one frame if there is anything new to show.
    fn draw(&self, ctx: &mut FrameContext<'_>) -> RenderResult<DrawOutcome>;

    /// Give back every GPU resource acquired since `setup`.
    fn release(&self, ctx: &mut FrameContext<'_>);
}

/// Per-tick access to the shared context and texture pool.
pub struct FrameContext<'a> {
    context: &'a mut dyn GpuContext,
    background: SurfaceId,
    cache: &'a ResourceCache<Texture>,
    metrics: &'a RenderMetrics,
    clear_color: [f32; 4],
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(
        context: &'a mut dyn GpuContext,
        background: SurfaceId,
        cache: &'a ResourceCache<Texture>,
        metrics: &'a RenderMetrics,
        clear_color: [f32; 4],
    ) -> Self {
        Self {
            context,
            background,
            cache,
            metrics,
            clear_color,
        }
    }

    pub fn create_window_surface(&mut self, window: NativeWindow) -> RenderResult<SurfaceId> {
        let surface = self.context.create_window_surface(window)?;
        trace!(%window, %surface, "Window surface created");
        Ok(surface)
    }

    pub fn release_surface(&mut self, surface: SurfaceId) {
        self.context.release_surface(surface);
    }

    /// Make `surface` current, or the background surface for `None`.
    pub fn make_current(&mut self, surface: Option<SurfaceId>) -> RenderResult<()> {
        self.context
            .make_current(surface.unwrap_or(self.background))?;
        Ok(())
    }

    pub fn swap_buffers(&mut self, surface: SurfaceId) -> bool {
        self.context.swap_buffers(surface)
    }

    /// Take a texture from the shared pool.
    pub fn fetch_texture(
        &mut self,
        width: u32,
        height: u32,
        attributes: &TextureAttributes,
    ) -> Texture {
        self.metrics.record_texture_fetch();
        self.cache.fetch(width, height, attributes)
    }

    /// Return a texture to the shared pool. Storage that cannot be pooled
    /// is deleted first.
    pub fn return_texture(&mut self, mut texture: Texture) {
        if !texture.is_cacheable() {
            texture.destroy(self.context.device());
        }
        self.cache.give_back(texture);
    }

    pub fn device(&mut self) -> &mut dyn GpuDevice {
        self.context.device()
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }
}
