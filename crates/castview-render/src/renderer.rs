//! Per-window renderer drawing one textured quad.

use bytes::Bytes;
use castview_capture::PixelFormat;
use castview_gpu::{
    BufferId, GpuDevice, GpuError, Location, NativeWindow, ProgramId, SurfaceId, TexelFormat,
    TextureAttributes,
};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::RenderError;
use crate::projection::{aspect_fit_projection, ScaleType};
use crate::shaders::{
    ShaderSet, ATTR_MODEL_COORDS, ATTR_TEX_COORDS, ATTR_UV_TEX_COORDS, UNIFORM_COLOR_MAP,
    UNIFORM_MVP, UNIFORM_UV_COLOR_MAP,
};
use crate::target::{DrawOutcome, FrameContext, RenderTarget, RendererId};
use crate::texture::Texture;
use crate::RenderResult;

/// Full-viewport quad as a triangle strip.
const QUAD: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

struct PendingFrame {
    data: Bytes,
    width: u32,
    height: u32,
    format: PixelFormat,
}

#[derive(Default)]
struct PixelSlot {
    frame: Option<PendingFrame>,
    replaced: u64,
}

struct ViewState {
    window: Option<NativeWindow>,
    output: (u32, u32),
    frame_size: (u32, u32),
    format: PixelFormat,
    scale_type: ScaleType,
    projection: [f32; 16],
    force_refresh: bool,
}

impl ViewState {
    fn update_projection(&mut self) {
        self.projection = aspect_fit_projection(self.scale_type, self.output, self.frame_size);
    }
}

struct ProgramBinding {
    program: ProgramId,
    format: PixelFormat,
    model_coords: Location,
    tex_coords: Location,
    mvp: Location,
    color_map: Location,
    uv_color_map: Option<Location>,
    uv_tex_coords: Option<Location>,
}

#[derive(Default)]
struct GpuState {
    program: Option<ProgramBinding>,
    planes: Vec<Texture>,
    /// Frame size the planes were fetched for.
    frame_size: (u32, u32),
    buffers: Option<[BufferId; 2]>,
    /// Byte size the pixel buffers were allocated with.
    buffer_len: usize,
    /// Cleared when buffer allocation fails; uploads then go through staging.
    use_buffers: bool,
    next_buffer: usize,
    surface: Option<(SurfaceId, NativeWindow)>,
}

struct DrawSnapshot {
    window: NativeWindow,
    output: (u32, u32),
    projection: [f32; 16],
    format: PixelFormat,
}

/// Whether every plane of a `width` x `height` frame has a nonzero size.
fn drawable_size(format: PixelFormat, width: u32, height: u32) -> bool {
    match format {
        // Chroma plane is half width.
        PixelFormat::Yuyv => width >= 2 && height > 0,
        _ => width > 0 && height > 0,
    }
}

/// Texture planes needed to draw a `width` x `height` frame in `format`.
fn plane_layout(format: PixelFormat, width: u32, height: u32) -> Vec<(u32, u32, TextureAttributes)> {
    match format {
        PixelFormat::Rgba => vec![(width, height, TextureAttributes::with_format(TexelFormat::Rgba))],
        PixelFormat::Yuyv => vec![
            (
                width,
                height,
                TextureAttributes::with_format(TexelFormat::LuminanceAlpha),
            ),
            (
                width / 2,
                height,
                TextureAttributes::with_format(TexelFormat::Rgba),
            ),
        ],
        PixelFormat::Rgb | PixelFormat::I420 | PixelFormat::Nv21 => Vec::new(),
    }
}

/// Strip coordinates covering the logical width of a padded plane.
fn quad_tex_coords(plane: &Texture) -> [f32; 8] {
    let s = plane.coverage();
    [0.0, 0.0, s, 0.0, 0.0, 1.0, s, 1.0]
}

fn attrib(device: &mut dyn GpuDevice, program: ProgramId, name: &str) -> RenderResult<Location> {
    device
        .attrib_location(program, name)
        .ok_or_else(|| GpuError::MissingInput(name.to_string()).into())
}

fn uniform(device: &mut dyn GpuDevice, program: ProgramId, name: &str) -> RenderResult<Location> {
    device
        .uniform_location(program, name)
        .ok_or_else(|| GpuError::MissingInput(name.to_string()).into())
}

fn resolve_binding(
    device: &mut dyn GpuDevice,
    program: ProgramId,
    format: PixelFormat,
) -> RenderResult<ProgramBinding> {
    let (uv_color_map, uv_tex_coords) = match format {
        PixelFormat::Yuyv => (
            Some(uniform(device, program, UNIFORM_UV_COLOR_MAP)?),
            Some(attrib(device, program, ATTR_UV_TEX_COORDS)?),
        ),
        _ => (None, None),
    };

    Ok(ProgramBinding {
        program,
        format,
        model_coords: attrib(device, program, ATTR_MODEL_COORDS)?,
        tex_coords: attrib(device, program, ATTR_TEX_COORDS)?,
        mvp: uniform(device, program, UNIFORM_MVP)?,
        color_map: uniform(device, program, UNIFORM_COLOR_MAP)?,
        uv_color_map,
        uv_tex_coords,
    })
}

/// Draws frames handed in by a producer thread into one native window.
///
/// Producer-side calls (`upload_texture`, `set_output_size`, `bind_window`,
/// ...) only touch CPU state. GPU work happens in the [`RenderTarget`]
/// methods, which the render loop calls on its own thread.
pub struct Renderer {
    id: RendererId,
    name: String,
    shaders: ShaderSet,
    pixels: Mutex<PixelSlot>,
    view: Mutex<ViewState>,
    gpu: Mutex<GpuState>,
}

impl Renderer {
    /// Create an RGBA renderer with the built-in shaders.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_shaders(name, ShaderSet::default())
    }

    pub fn with_shaders(name: impl Into<String>, shaders: ShaderSet) -> Self {
        Self {
            id: RendererId::next(),
            name: name.into(),
            shaders,
            pixels: Mutex::new(PixelSlot::default()),
            view: Mutex::new(ViewState {
                window: None,
                output: (0, 0),
                frame_size: (0, 0),
                format: PixelFormat::Rgba,
                scale_type: ScaleType::default(),
                projection: aspect_fit_projection(ScaleType::default(), (0, 0), (0, 0)),
                force_refresh: true,
            }),
            gpu: Mutex::new(GpuState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hand over a frame for the next draw, replacing one not yet drawn.
    pub fn upload_texture(&self, data: Bytes, width: u32, height: u32) -> RenderResult<()> {
        let format = {
            let mut view = self.view.lock();
            if !drawable_size(view.format, width, height) {
                return Err(RenderError::InvalidFrameSize {
                    width,
                    height,
                    format: view.format,
                });
            }
            let expected = view.format.frame_len(width, height);
            if data.len() < expected {
                return Err(RenderError::ShortBuffer {
                    expected,
                    actual: data.len(),
                });
            }
            if view.frame_size != (width, height) {
                debug!(renderer = %self.id, width, height, "Frame size changed");
                view.frame_size = (width, height);
                view.update_projection();
            }
            view.format
        };

        let mut slot = self.pixels.lock();
        let previous = slot.frame.replace(PendingFrame {
            data,
            width,
            height,
            format,
        });
        if previous.is_some() {
            slot.replaced += 1;
        }
        Ok(())
    }

    /// Resize the output. Returns false if the size is unchanged.
    pub fn set_output_size(&self, width: u32, height: u32) -> bool {
        let mut view = self.view.lock();
        if view.output == (width, height) {
            return false;
        }
        view.output = (width, height);
        view.update_projection();
        view.force_refresh = true;
        true
    }

    /// Bind or unbind the output window. The surface follows on the next draw.
    #[instrument(name = "renderer_bind_window", skip(self), fields(renderer = %self.id))]
    pub fn bind_window(&self, window: Option<NativeWindow>) {
        let mut view = self.view.lock();
        if view.window != window {
            info!(?window, "Output window bound");
            view.window = window;
            view.force_refresh = true;
        }
    }

    /// Switch the texture layout. Pending frames in the old layout are dropped.
    pub fn set_texture_format(&self, format: PixelFormat) -> RenderResult<()> {
        if self.shaders.fragment_for(format).is_none() {
            return Err(RenderError::UnsupportedFormat(format));
        }

        let mut view = self.view.lock();
        if view.format != format {
            debug!(renderer = %self.id, %format, "Texture format changed");
            view.format = format;
            view.force_refresh = true;
            self.pixels.lock().frame = None;
        }
        Ok(())
    }

    pub fn set_scale_type(&self, scale_type: ScaleType) {
        let mut view = self.view.lock();
        if view.scale_type != scale_type {
            view.scale_type = scale_type;
            view.update_projection();
            view.force_refresh = true;
        }
    }

    pub fn projection(&self) -> [f32; 16] {
        self.view.lock().projection
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.view.lock().output
    }

    /// Size of the most recently uploaded frame.
    pub fn frame_size(&self) -> (u32, u32) {
        self.view.lock().frame_size
    }

    pub fn texture_format(&self) -> PixelFormat {
        self.view.lock().format
    }

    pub fn scale_type(&self) -> ScaleType {
        self.view.lock().scale_type
    }

    pub fn window(&self) -> Option<NativeWindow> {
        self.view.lock().window
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pixels.lock().frame.is_some()
    }

    /// Frames overwritten before the render loop drew them.
    pub fn replaced_frames(&self) -> u64 {
        self.pixels.lock().replaced
    }

    fn build_program(
        &self,
        ctx: &mut FrameContext<'_>,
        format: PixelFormat,
    ) -> RenderResult<ProgramBinding> {
        let fragment = self
            .shaders
            .fragment_for(format)
            .ok_or(RenderError::UnsupportedFormat(format))?;

        let device = ctx.device();
        let program = device.compile_program(&self.shaders.vertex, fragment)?;

        let resolved = resolve_binding(device, program, format);
        if resolved.is_err() {
            device.delete_program(program);
        }
        resolved
    }

    fn create_buffers(ctx: &mut FrameContext<'_>, size: usize) -> RenderResult<[BufferId; 2]> {
        let device = ctx.device();
        let first = device.create_pixel_buffer(size)?;
        match device.create_pixel_buffer(size) {
            Ok(second) => Ok([first, second]),
            Err(e) => {
                device.delete_pixel_buffer(first);
                Err(e.into())
            }
        }
    }

    fn delete_buffers(gpu: &mut GpuState, ctx: &mut FrameContext<'_>) {
        if let Some(buffers) = gpu.buffers.take() {
            for buffer in buffers {
                ctx.device().delete_pixel_buffer(buffer);
            }
        }
        gpu.buffer_len = 0;
        gpu.next_buffer = 0;
    }

    /// Pixel buffers holding `len` bytes, reallocated when the frame length
    /// changes. `None` means uploads go through the staging path.
    fn ensure_buffers(
        gpu: &mut GpuState,
        ctx: &mut FrameContext<'_>,
        len: usize,
    ) -> Option<[BufferId; 2]> {
        if !gpu.use_buffers {
            return None;
        }
        if let Some(buffers) = gpu.buffers {
            if gpu.buffer_len == len {
                return Some(buffers);
            }
            Self::delete_buffers(gpu, ctx);
        }

        match Self::create_buffers(ctx, len) {
            Ok(buffers) => {
                debug!(size = len, "Pixel buffers allocated");
                gpu.buffers = Some(buffers);
                gpu.buffer_len = len;
                Some(buffers)
            }
            Err(e) => {
                warn!("Pixel buffers unavailable, staging uploads instead: {}", e);
                gpu.use_buffers = false;
                None
            }
        }
    }

    fn fetch_planes(
        gpu: &mut GpuState,
        ctx: &mut FrameContext<'_>,
        format: PixelFormat,
        size: (u32, u32),
    ) {
        for plane in gpu.planes.drain(..) {
            ctx.return_texture(plane);
        }
        gpu.planes = plane_layout(format, size.0, size.1)
            .into_iter()
            .map(|(width, height, attributes)| ctx.fetch_texture(width, height, &attributes))
            .collect();
        gpu.frame_size = size;
        debug!(%format, width = size.0, height = size.1, planes = gpu.planes.len(), "Textures fetched");
    }

    fn release_surface(gpu: &mut GpuState, ctx: &mut FrameContext<'_>) {
        if let Some((surface, _)) = gpu.surface.take() {
            if let Err(e) = ctx.make_current(None) {
                warn!("Failed to switch to background surface: {}", e);
            }
            ctx.release_surface(surface);
        }
    }

    fn release_gpu(gpu: &mut GpuState, ctx: &mut FrameContext<'_>) {
        for plane in gpu.planes.drain(..) {
            ctx.return_texture(plane);
        }
        Self::delete_buffers(gpu, ctx);
        gpu.use_buffers = false;
        if let Some(binding) = gpu.program.take() {
            ctx.device().delete_program(binding.program);
        }
        Self::release_surface(gpu, ctx);
        gpu.frame_size = (0, 0);
    }

    fn upload_frame(
        gpu: &mut GpuState,
        ctx: &mut FrameContext<'_>,
        frame: PendingFrame,
    ) -> RenderResult<()> {
        let size = (frame.width, frame.height);
        if gpu.planes.is_empty() || gpu.frame_size != size {
            Self::fetch_planes(gpu, ctx, frame.format, size);
        }

        let len = frame.format.frame_len(frame.width, frame.height);
        match Self::ensure_buffers(gpu, ctx, len) {
            Some(buffers) => {
                let data = frame.data.get(..len).ok_or(RenderError::ShortBuffer {
                    expected: len,
                    actual: frame.data.len(),
                })?;
                let buffer = buffers[gpu.next_buffer];
                gpu.next_buffer ^= 1;

                let device = ctx.device();
                device.write_pixel_buffer(buffer, data);
                for plane in gpu.planes.iter_mut() {
                    plane.upload_from_buffer(device, buffer, 0)?;
                }
            }
            None => {
                for plane in gpu.planes.iter_mut() {
                    plane.upload_pixels(&frame.data)?;
                    plane.handle(ctx.device())?;
                }
            }
        }
        trace!(width = frame.width, height = frame.height, "Frame uploaded");
        Ok(())
    }

    fn present(
        &self,
        gpu: &mut GpuState,
        ctx: &mut FrameContext<'_>,
        snapshot: &DrawSnapshot,
        pending: Option<PendingFrame>,
    ) -> RenderResult<DrawOutcome> {
        let surface = match gpu.surface {
            Some((surface, window)) if window == snapshot.window => surface,
            _ => {
                Self::release_surface(gpu, ctx);
                let surface = ctx.create_window_surface(snapshot.window)?;
                gpu.surface = Some((surface, snapshot.window));
                surface
            }
        };
        ctx.make_current(Some(surface))?;

        if gpu.program.as_ref().map(|p| p.format) != Some(snapshot.format) {
            for plane in gpu.planes.drain(..) {
                ctx.return_texture(plane);
            }
            gpu.frame_size = (0, 0);
            if let Some(old) = gpu.program.take() {
                ctx.device().delete_program(old.program);
            }
            gpu.program = Some(self.build_program(ctx, snapshot.format)?);
            debug!(renderer = %self.id, format = %snapshot.format, "Program rebuilt");
        }

        if let Some(frame) = pending {
            if frame.format == snapshot.format {
                Self::upload_frame(gpu, ctx, frame)?;
            } else {
                trace!(renderer = %self.id, "Dropping frame in previous format");
            }
        }

        let clear_color = ctx.clear_color();
        {
            let device = ctx.device();
            device.viewport(0, 0, snapshot.output.0, snapshot.output.1);
            device.clear(clear_color);

            if let (Some(binding), Some(first)) = (gpu.program.as_ref(), gpu.planes.first()) {
                device.use_program(binding.program);
                device.uniform_matrix4(binding.mvp, &snapshot.projection);
                device.vertex_attrib(binding.model_coords, 2, &QUAD);
                device.vertex_attrib(binding.tex_coords, 2, &quad_tex_coords(first));
                if let (Some(location), Some(chroma)) =
                    (binding.uv_tex_coords, gpu.planes.get(1))
                {
                    device.vertex_attrib(location, 2, &quad_tex_coords(chroma));
                }

                for (unit, plane) in gpu.planes.iter_mut().enumerate() {
                    let id = plane.handle(device)?;
                    device.bind_texture(unit as u32, id, plane.attributes().target);
                }
                device.uniform_sampler(binding.color_map, 0);
                if let Some(uv) = binding.uv_color_map {
                    device.uniform_sampler(uv, 1);
                }
                device.draw_triangle_strip(4);
            }
        }

        if !ctx.swap_buffers(surface) {
            Self::release_surface(gpu, ctx);
            return Err(RenderError::PresentFailed);
        }
        if let Some(code) = ctx.device().take_error() {
            return Err(GpuError::Driver { code }.into());
        }
        Ok(DrawOutcome::Presented)
    }
}

impl RenderTarget for Renderer {
    fn id(&self) -> RendererId {
        self.id
    }

    #[instrument(name = "renderer_setup", skip_all, fields(renderer = %self.id))]
    fn setup(&self, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        let (format, frame_size) = {
            let view = self.view.lock();
            (view.format, view.frame_size)
        };

        let mut gpu = self.gpu.lock();
        let binding = self.build_program(ctx, format)?;
        gpu.program = Some(binding);

        gpu.use_buffers = true;
        if drawable_size(format, frame_size.0, frame_size.1) {
            Self::ensure_buffers(&mut gpu, ctx, format.frame_len(frame_size.0, frame_size.1));
            Self::fetch_planes(&mut gpu, ctx, format, frame_size);
        }

        if let Some(code) = ctx.device().take_error() {
            Self::release_gpu(&mut gpu, ctx);
            return Err(GpuError::Driver { code }.into());
        }

        self.view.lock().force_refresh = true;
        info!(name = %self.name, %format, "Renderer ready");
        Ok(())
    }

    fn draw(&self, ctx: &mut FrameContext<'_>) -> RenderResult<DrawOutcome> {
        let mut gpu = self.gpu.lock();

        let snapshot = {
            let view = self.view.lock();
            match view.window {
                Some(window) => Some(DrawSnapshot {
                    window,
                    output: view.output,
                    projection: view.projection,
                    format: view.format,
                }),
                None => None,
            }
        };
        let Some(snapshot) = snapshot else {
            Self::release_surface(&mut gpu, ctx);
            return Ok(DrawOutcome::Skipped);
        };

        let forced = std::mem::take(&mut self.view.lock().force_refresh);
        let surface_stale = gpu.surface.map(|(_, window)| window) != Some(snapshot.window);
        let pending = self.pixels.lock().frame.take();

        if pending.is_none() && !forced && !surface_stale {
            return Ok(DrawOutcome::Skipped);
        }

        let result = self.present(&mut gpu, ctx, &snapshot, pending);
        if result.is_err() {
            self.view.lock().force_refresh = true;
        }
        result
    }

    #[instrument(name = "renderer_release", skip_all, fields(renderer = %self.id))]
    fn release(&self, ctx: &mut FrameContext<'_>) {
        let mut gpu = self.gpu.lock();
        Self::release_gpu(&mut gpu, ctx);
        self.view.lock().force_refresh = true;
        info!(name = %self.name, "Renderer released");
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let gpu = self.gpu.get_mut();
        if gpu.program.is_some() || gpu.surface.is_some() {
            warn!(renderer = %self.id, "Renderer dropped while holding GPU resources");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResourceCache;
    use crate::metrics::RenderMetrics;
    use castview_gpu::headless::{GpuCall, HeadlessProvider};
    use castview_gpu::{ContextProvider, GpuContext, TextureId};

    struct Harness {
        provider: HeadlessProvider,
        context: Box<dyn GpuContext>,
        background: SurfaceId,
        cache: ResourceCache<Texture>,
        metrics: RenderMetrics,
    }

    impl Harness {
        fn new() -> Self {
            let provider = HeadlessProvider::new();
            let mut context = provider.create_context().unwrap();
            let background = context.create_offscreen_surface(1, 1).unwrap();
            context.make_current(background).unwrap();
            Self {
                provider,
                context,
                background,
                cache: ResourceCache::new(),
                metrics: RenderMetrics::new(),
            }
        }

        fn frame(&mut self) -> FrameContext<'_> {
            FrameContext::new(
                self.context.as_mut(),
                self.background,
                &self.cache,
                &self.metrics,
                [0.2, 0.3, 0.3, 1.0],
            )
        }

        fn count(&self, pred: impl Fn(&GpuCall) -> bool) -> usize {
            self.provider.count_calls(pred)
        }
    }

    fn ready_renderer(harness: &mut Harness) -> Renderer {
        let renderer = Renderer::new("test");
        renderer.setup(&mut harness.frame()).unwrap();
        renderer.bind_window(Some(NativeWindow(7)));
        renderer.set_output_size(100, 100);
        renderer
    }

    #[test]
    fn test_set_output_size_is_idempotent() {
        let renderer = Renderer::new("test");
        renderer
            .upload_texture(Bytes::from(vec![0u8; 16]), 2, 2)
            .unwrap();

        assert!(renderer.set_output_size(640, 480));
        let projection = renderer.projection();
        assert!(!renderer.set_output_size(640, 480));
        assert_eq!(renderer.projection(), projection);
    }

    #[test]
    fn test_scale_fit_scenario() {
        let renderer = Renderer::new("test");
        renderer.set_output_size(100, 100);
        renderer
            .upload_texture(Bytes::from(vec![0u8; 50 * 200 * 4]), 50, 200)
            .unwrap();

        let m = renderer.projection();
        assert!((m[0] - 0.25).abs() < 1e-6);
        assert!((m[5] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_short_upload_is_rejected() {
        let renderer = Renderer::new("test");
        let err = renderer
            .upload_texture(Bytes::from(vec![0u8; 15]), 2, 2)
            .unwrap_err();
        assert!(matches!(err, RenderError::ShortBuffer { expected: 16, .. }));
        assert!(!renderer.has_pending_frame());
    }

    #[test]
    fn test_degenerate_frames_are_rejected() {
        let renderer = Renderer::new("test");
        for (width, height) in [(0, 0), (0, 4), (4, 0)] {
            let err = renderer.upload_texture(Bytes::new(), width, height).unwrap_err();
            assert!(matches!(err, RenderError::InvalidFrameSize { .. }));
        }

        renderer.set_texture_format(PixelFormat::Yuyv).unwrap();
        let err = renderer
            .upload_texture(Bytes::from(vec![0u8; 4]), 1, 2)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidFrameSize {
                width: 1,
                format: PixelFormat::Yuyv,
                ..
            }
        ));

        assert!(!renderer.has_pending_frame());
        assert_eq!(renderer.frame_size(), (0, 0));
        renderer.upload_texture(Bytes::from(vec![0u8; 8]), 2, 2).unwrap();
    }

    #[test]
    fn test_latest_upload_wins() {
        let renderer = Renderer::new("test");
        renderer.upload_texture(Bytes::from(vec![1u8; 4]), 1, 1).unwrap();
        renderer.upload_texture(Bytes::from(vec![2u8; 4]), 1, 1).unwrap();
        assert_eq!(renderer.replaced_frames(), 1);
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let renderer = Renderer::new("test");
        assert!(matches!(
            renderer.set_texture_format(PixelFormat::I420),
            Err(RenderError::UnsupportedFormat(PixelFormat::I420))
        ));
        assert_eq!(renderer.texture_format(), PixelFormat::Rgba);
    }

    #[test]
    fn test_draw_without_window_is_noop() {
        let mut harness = Harness::new();
        let renderer = Renderer::new("test");
        renderer.setup(&mut harness.frame()).unwrap();
        renderer
            .upload_texture(Bytes::from(vec![0u8; 16]), 2, 2)
            .unwrap();

        harness.provider.clear_calls();
        let outcome = renderer.draw(&mut harness.frame()).unwrap();

        assert_eq!(outcome, DrawOutcome::Skipped);
        assert!(harness.provider.calls().is_empty());
        renderer.release(&mut harness.frame());
    }

    #[test]
    fn test_uploaded_pixels_reach_texture() {
        let mut harness = Harness::new();
        let renderer = ready_renderer(&mut harness);
        let pixels: Vec<u8> = (0..16).collect();
        renderer
            .upload_texture(Bytes::from(pixels.clone()), 2, 2)
            .unwrap();

        let outcome = renderer.draw(&mut harness.frame()).unwrap();
        assert_eq!(outcome, DrawOutcome::Presented);

        let texture = harness
            .provider
            .calls()
            .iter()
            .find_map(|c| match c.call {
                GpuCall::BindTexture { unit: 0, texture } => Some(texture),
                _ => None,
            })
            .unwrap();
        assert_eq!(harness.provider.texture_data(texture).unwrap(), pixels);
        assert_eq!(harness.count(|c| matches!(c, GpuCall::DrawTriangleStrip(4))), 1);
        assert_eq!(harness.count(|c| matches!(c, GpuCall::SwapBuffers(_))), 1);

        renderer.release(&mut harness.frame());
    }

    #[test]
    fn test_no_new_pixels_skips_draw() {
        let mut harness = Harness::new();
        let renderer = ready_renderer(&mut harness);
        renderer
            .upload_texture(Bytes::from(vec![0u8; 16]), 2, 2)
            .unwrap();
        renderer.draw(&mut harness.frame()).unwrap();

        assert_eq!(
            renderer.draw(&mut harness.frame()).unwrap(),
            DrawOutcome::Skipped
        );

        renderer.set_output_size(200, 100);
        assert_eq!(
            renderer.draw(&mut harness.frame()).unwrap(),
            DrawOutcome::Presented
        );
        assert_eq!(
            renderer.draw(&mut harness.frame()).unwrap(),
            DrawOutcome::Skipped
        );

        renderer.release(&mut harness.frame());
    }

    #[test]
    fn test_pixel_buffers_alternate() {
        let mut harness = Harness::new();
        let renderer = ready_renderer(&mut harness);

        for value in 0..3u8 {
            renderer
                .upload_texture(Bytes::from(vec![value; 16]), 2, 2)
                .unwrap();
            renderer.draw(&mut harness.frame()).unwrap();
        }

        let buffers: Vec<BufferId> = harness
            .provider
            .calls()
            .iter()
            .filter_map(|c| match c.call {
                GpuCall::UploadFromBuffer { buffer, .. } => Some(buffer),
                _ => None,
            })
            .collect();
        assert_eq!(buffers.len(), 3);
        assert_ne!(buffers[0], buffers[1]);
        assert_eq!(buffers[0], buffers[2]);

        renderer.release(&mut harness.frame());
    }

    #[test]
    fn test_yuyv_uses_two_planes() {
        let mut harness = Harness::new();
        let renderer = Renderer::new("yuyv");
        renderer.set_texture_format(PixelFormat::Yuyv).unwrap();
        renderer.setup(&mut harness.frame()).unwrap();
        renderer.bind_window(Some(NativeWindow(1)));
        renderer.set_output_size(4, 2);

        let frame: Vec<u8> = vec![16, 128, 235, 64, 81, 90, 145, 54, 16, 128, 235, 64, 81, 90, 145, 54];
        renderer.upload_texture(Bytes::from(frame.clone()), 4, 2).unwrap();
        renderer.draw(&mut harness.frame()).unwrap();

        let bound: Vec<(u32, TextureId)> = harness
            .provider
            .calls()
            .iter()
            .filter_map(|c| match c.call {
                GpuCall::BindTexture { unit, texture } => Some((unit, texture)),
                _ => None,
            })
            .collect();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].0, 0);
        assert_eq!(bound[1].0, 1);

        assert_eq!(harness.provider.texture_size(bound[0].1), Some((4, 2)));
        assert_eq!(harness.provider.texture_size(bound[1].1), Some((2, 2)));
        assert_eq!(harness.provider.texture_data(bound[0].1).unwrap(), frame);
        assert_eq!(harness.provider.texture_data(bound[1].1).unwrap(), frame);
        assert_eq!(
            harness.count(|c| matches!(c, GpuCall::UniformSampler { unit: 1, .. })),
            1
        );

        renderer.release(&mut harness.frame());
    }

    #[test]
    fn test_pixel_buffers_follow_frame_size() {
        let mut harness = Harness::new();
        let renderer = ready_renderer(&mut harness);
        assert_eq!(harness.provider.live_buffers(), 0);

        renderer.upload_texture(Bytes::from(vec![1u8; 16]), 2, 2).unwrap();
        renderer.draw(&mut harness.frame()).unwrap();
        renderer
            .upload_texture(Bytes::from(vec![2u8; 64 * 64 * 4]), 64, 64)
            .unwrap();
        renderer.draw(&mut harness.frame()).unwrap();

        let calls = harness.provider.calls();
        let sizes: Vec<usize> = calls
            .iter()
            .filter_map(|c| match c.call {
                GpuCall::CreatePixelBuffer { size, .. } => Some(size),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![16, 16, 64 * 64 * 4, 64 * 64 * 4]);
        assert_eq!(harness.count(|c| matches!(c, GpuCall::DeletePixelBuffer(_))), 2);
        assert_eq!(harness.provider.live_buffers(), 2);

        let texture = calls
            .iter()
            .rev()
            .find_map(|c| match c.call {
                GpuCall::BindTexture { unit: 0, texture } => Some(texture),
                _ => None,
            })
            .unwrap();
        assert_eq!(harness.provider.texture_data(texture).unwrap(), vec![2u8; 64 * 64 * 4]);

        renderer.release(&mut harness.frame());
        assert_eq!(harness.provider.live_buffers(), 0);
    }

    #[test]
    fn test_setup_sizes_buffers_for_known_frame() {
        let mut harness = Harness::new();
        let renderer = Renderer::new("test");
        renderer.upload_texture(Bytes::from(vec![0u8; 24]), 3, 2).unwrap();
        renderer.setup(&mut harness.frame()).unwrap();

        assert_eq!(
            harness.count(|c| matches!(c, GpuCall::CreatePixelBuffer { size: 24, .. })),
            2
        );
        renderer.release(&mut harness.frame());
    }

    #[test]
    fn test_chroma_plane_has_own_coordinates() {
        let mut harness = Harness::new();
        let renderer = Renderer::new("yuyv");
        renderer.set_texture_format(PixelFormat::Yuyv).unwrap();
        renderer.setup(&mut harness.frame()).unwrap();
        renderer.bind_window(Some(NativeWindow(1)));
        renderer.set_output_size(6, 2);

        renderer.upload_texture(Bytes::from(vec![0u8; 24]), 6, 2).unwrap();
        renderer.draw(&mut harness.frame()).unwrap();

        let coords: Vec<Vec<f32>> = harness
            .provider
            .calls()
            .iter()
            .filter_map(|c| match &c.call {
                GpuCall::VertexAttrib { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(coords.len(), 3);
        assert_eq!(coords[0], QUAD.to_vec());
        // Luminance plane is 6 wide; the 3-wide chroma plane is padded to 4.
        assert_eq!(coords[1], vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(coords[2], vec![0.0, 0.0, 0.75, 0.0, 0.0, 1.0, 0.75, 1.0]);

        renderer.release(&mut harness.frame());
    }

    #[test]
    fn test_format_switch_rebuilds_program() {
        let mut harness = Harness::new();
        let renderer = ready_renderer(&mut harness);
        renderer.upload_texture(Bytes::from(vec![0u8; 16]), 2, 2).unwrap();
        renderer.draw(&mut harness.frame()).unwrap();

        renderer.set_texture_format(PixelFormat::Yuyv).unwrap();
        assert!(!renderer.has_pending_frame());
        renderer.upload_texture(Bytes::from(vec![0u8; 8]), 2, 2).unwrap();
        renderer.draw(&mut harness.frame()).unwrap();

        assert_eq!(harness.count(|c| matches!(c, GpuCall::CompileProgram(_))), 2);
        assert_eq!(harness.count(|c| matches!(c, GpuCall::DeleteProgram(_))), 1);
        assert_eq!(harness.provider.live_programs(), 1);

        renderer.release(&mut harness.frame());
        assert_eq!(harness.provider.live_programs(), 0);
    }

    #[test]
    fn test_rebinding_window_recreates_surface() {
        let mut harness = Harness::new();
        let renderer = ready_renderer(&mut harness);
        renderer.draw(&mut harness.frame()).unwrap();

        renderer.bind_window(Some(NativeWindow(8)));
        renderer.draw(&mut harness.frame()).unwrap();

        let windows: Vec<NativeWindow> = harness
            .provider
            .calls()
            .iter()
            .filter_map(|c| match c.call {
                GpuCall::CreateWindowSurface { window, .. } => Some(window),
                _ => None,
            })
            .collect();
        assert_eq!(windows, vec![NativeWindow(7), NativeWindow(8)]);
        assert_eq!(harness.count(|c| matches!(c, GpuCall::ReleaseSurface(_))), 1);

        renderer.bind_window(None);
        assert_eq!(
            renderer.draw(&mut harness.frame()).unwrap(),
            DrawOutcome::Skipped
        );
        assert_eq!(harness.provider.live_surfaces(), 1);

        renderer.release(&mut harness.frame());
    }

    #[test]
    fn test_release_returns_textures_to_pool() {
        let mut harness = Harness::new();
        let renderer = ready_renderer(&mut harness);
        renderer.upload_texture(Bytes::from(vec![0u8; 16]), 2, 2).unwrap();
        renderer.draw(&mut harness.frame()).unwrap();

        renderer.release(&mut harness.frame());

        assert_eq!(harness.cache.pooled(), 1);
        assert_eq!(harness.provider.live_programs(), 0);
        assert_eq!(harness.provider.live_buffers(), 0);
        // Only the background surface remains.
        assert_eq!(harness.provider.live_surfaces(), 1);

        harness
            .cache
            .purge(|mut t| t.destroy(harness.context.device()));
        assert_eq!(harness.provider.live_textures(), 0);
    }

    #[test]
    fn test_failed_setup_leaves_nothing_behind() {
        let mut harness = Harness::new();
        harness.provider.fail_next_compiles(1);

        let renderer = Renderer::new("test");
        assert!(renderer.setup(&mut harness.frame()).is_err());
        assert_eq!(harness.provider.live_programs(), 0);
        assert_eq!(harness.provider.live_buffers(), 0);

        renderer.setup(&mut harness.frame()).unwrap();
        renderer.release(&mut harness.frame());
    }

    #[test]
    fn test_driver_error_surfaces_from_draw() {
        let mut harness = Harness::new();
        let renderer = ready_renderer(&mut harness);
        harness.provider.raise_error(castview_gpu::ERROR_INVALID_OPERATION);

        let err = renderer.draw(&mut harness.frame()).unwrap_err();
        assert!(matches!(err, RenderError::Gpu(GpuError::Driver { code: 0x0502 })));

        // The refresh is retried on the next tick.
        assert_eq!(
            renderer.draw(&mut harness.frame()).unwrap(),
            DrawOutcome::Presented
        );
        renderer.release(&mut harness.frame());
    }
}
