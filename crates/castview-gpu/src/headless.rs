//! In-memory GPU backend.
//!
//! Textures and pixel buffers are plain byte vectors, draws are no-ops, and
//! every call is appended to a journal together with the calling thread. The
//! provider handle stays with the test (or the demo) and can inspect the
//! journal and the stored texels, or inject failures.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::types::{
    BufferId, Location, NativeWindow, ProgramId, SurfaceId, TextureAttributes, TextureId,
    TextureTarget, ERROR_INVALID_OPERATION, ERROR_INVALID_VALUE,
};
use crate::{ContextProvider, GpuContext, GpuDevice, GpuError, GpuResult};

/// A call received by a headless context.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateContext,
    DropContext,
    CreateWindowSurface {
        window: NativeWindow,
        surface: SurfaceId,
    },
    CreateOffscreenSurface {
        width: u32,
        height: u32,
        surface: SurfaceId,
    },
    MakeCurrent(SurfaceId),
    SwapBuffers(SurfaceId),
    ReleaseSurface(SurfaceId),
    CreateTexture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    UploadTexture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    UploadFromBuffer {
        texture: TextureId,
        buffer: BufferId,
        width: u32,
        height: u32,
    },
    DeleteTexture(TextureId),
    CreatePixelBuffer {
        buffer: BufferId,
        size: usize,
    },
    WritePixelBuffer {
        buffer: BufferId,
        len: usize,
    },
    DeletePixelBuffer(BufferId),
    CompileProgram(ProgramId),
    DeleteProgram(ProgramId),
    Viewport {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    Clear([f32; 4]),
    UseProgram(ProgramId),
    VertexAttrib {
        location: Location,
        data: Vec<f32>,
    },
    UniformMatrix4 {
        location: Location,
        matrix: [f32; 16],
    },
    BindTexture {
        unit: u32,
        texture: TextureId,
    },
    UniformSampler {
        location: Location,
        unit: u32,
    },
    DrawTriangleStrip(u32),
}

/// A journal entry.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub thread: ThreadId,
    pub call: GpuCall,
}

struct StoredTexture {
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
    data: Vec<u8>,
}

impl StoredTexture {
    /// Copy a tightly packed `width` x `height` region into the top-left corner.
    fn write_region(&mut self, width: u32, height: u32, pixels: &[u8]) -> Result<(), u32> {
        let bpp = self.bytes_per_pixel;
        let src_stride = width as usize * bpp;
        if pixels.len() < src_stride * height as usize {
            return Err(ERROR_INVALID_VALUE);
        }
        if width > self.width || height > self.height {
            return Err(ERROR_INVALID_VALUE);
        }

        let dst_stride = self.width as usize * bpp;
        for row in 0..height as usize {
            let src = &pixels[row * src_stride..(row + 1) * src_stride];
            let start = row * dst_stride;
            self.data[start..start + src_stride].copy_from_slice(src);
        }
        Ok(())
    }
}

struct StoredProgram {
    vertex: String,
    fragment: String,
    names: Vec<String>,
}

impl StoredProgram {
    fn location(&mut self, name: &str) -> Location {
        let index = match self.names.iter().position(|n| n == name) {
            Some(index) => index,
            None => {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        };
        Location(index as i32)
    }
}

#[derive(Default)]
struct HeadlessState {
    calls: Vec<RecordedCall>,
    next_id: u32,
    textures: HashMap<TextureId, StoredTexture>,
    buffers: HashMap<BufferId, Vec<u8>>,
    programs: HashMap<ProgramId, StoredProgram>,
    surfaces: HashMap<SurfaceId, Option<NativeWindow>>,
    live_contexts: usize,
    error: Option<u32>,
    fail_context_creation: bool,
    failing_compiles: usize,
    lost_windows: HashSet<NativeWindow>,
}

impl HeadlessState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, call: GpuCall) {
        trace!(?call, "gpu call");
        self.calls.push(RecordedCall {
            thread: thread::current().id(),
            call,
        });
    }

    /// Latch an error; the first one sticks until read, as drivers do.
    fn raise(&mut self, code: u32) {
        if self.error.is_none() {
            self.error = Some(code);
        }
    }
}

/// Provider for headless contexts, and the inspection handle for them.
#[derive(Clone, Default)]
pub struct HeadlessProvider {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `create_context` fail.
    pub fn fail_context_creation(&self, fail: bool) {
        self.state.lock().fail_context_creation = fail;
    }

    /// Make the next `count` program compilations fail.
    pub fn fail_next_compiles(&self, count: usize) {
        self.state.lock().failing_compiles = count;
    }

    /// Treat `window` as destroyed: surface creation fails and swaps on
    /// existing surfaces report failure.
    pub fn lose_window(&self, window: NativeWindow) {
        self.state.lock().lost_windows.insert(window);
    }

    /// Latch a driver error to be reported by the next `take_error`.
    pub fn raise_error(&self, code: u32) {
        self.state.lock().raise(code);
    }

    /// Snapshot of the journal.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Number of journal entries matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&GpuCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(&c.call)).count()
    }

    /// Distinct threads that issued calls.
    pub fn calling_threads(&self) -> HashSet<ThreadId> {
        self.state.lock().calls.iter().map(|c| c.thread).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Stored texels of a live texture, row-major at allocation width.
    pub fn texture_data(&self, texture: TextureId) -> Option<Vec<u8>> {
        self.state.lock().textures.get(&texture).map(|t| t.data.clone())
    }

    /// Allocated size of a live texture.
    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.state
            .lock()
            .textures
            .get(&texture)
            .map(|t| (t.width, t.height))
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.lock().programs.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.state.lock().surfaces.len()
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().live_contexts
    }
}

impl ContextProvider for HeadlessProvider {
    fn create_context(&self) -> GpuResult<Box<dyn GpuContext>> {
        let mut state = self.state.lock();
        if state.fail_context_creation {
            return Err(GpuError::ContextCreation("headless context disabled".into()));
        }

        state.live_contexts += 1;
        state.record(GpuCall::CreateContext);
        debug!("Created headless GPU context");

        Ok(Box::new(HeadlessContext {
            state: Arc::clone(&self.state),
            current: None,
        }))
    }
}

/// A context whose device stores everything in memory.
pub struct HeadlessContext {
    state: Arc<Mutex<HeadlessState>>,
    current: Option<SurfaceId>,
}

impl HeadlessContext {
    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock()
    }
}

impl GpuContext for HeadlessContext {
    fn create_window_surface(&mut self, window: NativeWindow) -> GpuResult<SurfaceId> {
        let mut state = self.lock();
        if state.lost_windows.contains(&window) {
            return Err(GpuError::WindowSurface(window));
        }

        let surface = SurfaceId(state.next_id() as u64);
        state.surfaces.insert(surface, Some(window));
        state.record(GpuCall::CreateWindowSurface { window, surface });
        Ok(surface)
    }

    fn create_offscreen_surface(&mut self, width: u32, height: u32) -> GpuResult<SurfaceId> {
        if width == 0 || height == 0 {
            return Err(GpuError::OffscreenSurface { width, height });
        }

        let mut state = self.lock();
        let surface = SurfaceId(state.next_id() as u64);
        state.surfaces.insert(surface, None);
        state.record(GpuCall::CreateOffscreenSurface {
            width,
            height,
            surface,
        });
        Ok(surface)
    }

    fn make_current(&mut self, surface: SurfaceId) -> GpuResult<()> {
        let mut state = self.lock();
        if !state.surfaces.contains_key(&surface) {
            return Err(GpuError::MakeCurrent(surface));
        }
        state.record(GpuCall::MakeCurrent(surface));
        drop(state);

        self.current = Some(surface);
        Ok(())
    }

    fn swap_buffers(&mut self, surface: SurfaceId) -> bool {
        let mut state = self.lock();
        state.record(GpuCall::SwapBuffers(surface));
        match state.surfaces.get(&surface) {
            Some(Some(window)) => !state.lost_windows.contains(window),
            Some(None) => true,
            None => false,
        }
    }

    fn release_surface(&mut self, surface: SurfaceId) {
        let mut state = self.lock();
        if state.surfaces.remove(&surface).is_none() {
            state.raise(ERROR_INVALID_VALUE);
        }
        state.record(GpuCall::ReleaseSurface(surface));
        drop(state);

        if self.current == Some(surface) {
            self.current = None;
        }
    }

    fn device(&mut self) -> &mut dyn GpuDevice {
        self
    }
}

impl GpuDevice for HeadlessContext {
    fn create_texture(
        &mut self,
        attributes: &TextureAttributes,
        width: u32,
        height: u32,
    ) -> GpuResult<TextureId> {
        if width == 0 || height == 0 {
            return Err(GpuError::TextureAllocation { width, height });
        }

        let mut state = self.lock();
        let texture = TextureId(state.next_id());
        let bytes_per_pixel = attributes.bytes_per_pixel();
        state.textures.insert(
            texture,
            StoredTexture {
                width,
                height,
                bytes_per_pixel,
                data: vec![0; width as usize * height as usize * bytes_per_pixel],
            },
        );
        state.record(GpuCall::CreateTexture {
            texture,
            width,
            height,
        });
        Ok(texture)
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        _attributes: &TextureAttributes,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) {
        let mut state = self.lock();
        state.record(GpuCall::UploadTexture {
            texture,
            width,
            height,
        });

        let result = match state.textures.get_mut(&texture) {
            Some(stored) => stored.write_region(width, height, pixels),
            None => Err(ERROR_INVALID_VALUE),
        };
        if let Err(code) = result {
            state.raise(code);
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        let mut state = self.lock();
        state.textures.remove(&texture);
        state.record(GpuCall::DeleteTexture(texture));
    }

    fn create_pixel_buffer(&mut self, size: usize) -> GpuResult<BufferId> {
        let mut state = self.lock();
        let buffer = BufferId(state.next_id());
        state.buffers.insert(buffer, vec![0; size]);
        state.record(GpuCall::CreatePixelBuffer { buffer, size });
        Ok(buffer)
    }

    fn write_pixel_buffer(&mut self, buffer: BufferId, data: &[u8]) {
        let mut state = self.lock();
        state.record(GpuCall::WritePixelBuffer {
            buffer,
            len: data.len(),
        });

        let Some(stored) = state.buffers.get_mut(&buffer) else {
            state.raise(ERROR_INVALID_VALUE);
            return;
        };
        let written = match stored.get_mut(..data.len()) {
            Some(region) => {
                region.copy_from_slice(data);
                true
            }
            None => false,
        };
        if !written {
            state.raise(ERROR_INVALID_VALUE);
        }
    }

    fn upload_texture_from_buffer(
        &mut self,
        texture: TextureId,
        _attributes: &TextureAttributes,
        width: u32,
        height: u32,
        buffer: BufferId,
        offset: usize,
    ) {
        let mut state = self.lock();
        state.record(GpuCall::UploadFromBuffer {
            texture,
            buffer,
            width,
            height,
        });

        let HeadlessState {
            textures, buffers, ..
        } = &mut *state;
        let result = match (textures.get_mut(&texture), buffers.get(&buffer)) {
            (Some(stored), Some(source)) if offset <= source.len() => {
                stored.write_region(width, height, &source[offset..])
            }
            _ => Err(ERROR_INVALID_VALUE),
        };
        if let Err(code) = result {
            state.raise(code);
        }
    }

    fn delete_pixel_buffer(&mut self, buffer: BufferId) {
        let mut state = self.lock();
        state.buffers.remove(&buffer);
        state.record(GpuCall::DeletePixelBuffer(buffer));
    }

    fn compile_program(&mut self, vertex: &str, fragment: &str) -> GpuResult<ProgramId> {
        let mut state = self.lock();
        if state.failing_compiles > 0 {
            state.failing_compiles -= 1;
            return Err(GpuError::ShaderCompile("injected compile failure".into()));
        }
        if vertex.trim().is_empty() {
            return Err(GpuError::ShaderCompile("empty vertex shader".into()));
        }
        if fragment.trim().is_empty() {
            return Err(GpuError::ShaderCompile("empty fragment shader".into()));
        }

        let program = ProgramId(state.next_id());
        state.programs.insert(
            program,
            StoredProgram {
                vertex: vertex.to_string(),
                fragment: fragment.to_string(),
                names: Vec::new(),
            },
        );
        state.record(GpuCall::CompileProgram(program));
        Ok(program)
    }

    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<Location> {
        let mut state = self.lock();
        let stored = state.programs.get_mut(&program)?;
        stored.vertex.contains(name).then(|| stored.location(name))
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<Location> {
        let mut state = self.lock();
        let stored = state.programs.get_mut(&program)?;
        let declared = stored.vertex.contains(name) || stored.fragment.contains(name);
        declared.then(|| stored.location(name))
    }

    fn delete_program(&mut self, program: ProgramId) {
        let mut state = self.lock();
        state.programs.remove(&program);
        state.record(GpuCall::DeleteProgram(program));
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.lock().record(GpuCall::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.lock().record(GpuCall::Clear(color));
    }

    fn use_program(&mut self, program: ProgramId) {
        let mut state = self.lock();
        if !state.programs.contains_key(&program) {
            state.raise(ERROR_INVALID_VALUE);
        }
        state.record(GpuCall::UseProgram(program));
    }

    fn vertex_attrib(&mut self, location: Location, _components: u32, data: &[f32]) {
        self.lock().record(GpuCall::VertexAttrib {
            location,
            data: data.to_vec(),
        });
    }

    fn uniform_matrix4(&mut self, location: Location, matrix: &[f32; 16]) {
        self.lock().record(GpuCall::UniformMatrix4 {
            location,
            matrix: *matrix,
        });
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId, _target: TextureTarget) {
        let mut state = self.lock();
        if !state.textures.contains_key(&texture) {
            state.raise(ERROR_INVALID_VALUE);
        }
        state.record(GpuCall::BindTexture { unit, texture });
    }

    fn uniform_sampler(&mut self, location: Location, unit: u32) {
        self.lock().record(GpuCall::UniformSampler { location, unit });
    }

    fn draw_triangle_strip(&mut self, vertex_count: u32) {
        let mut state = self.lock();
        if self.current.is_none() {
            state.raise(ERROR_INVALID_OPERATION);
        }
        state.record(GpuCall::DrawTriangleStrip(vertex_count));
    }

    fn take_error(&mut self) -> Option<u32> {
        self.lock().error.take()
    }
}

impl Drop for HeadlessContext {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.live_contexts = state.live_contexts.saturating_sub(1);
        state.record(GpuCall::DropContext);
        debug!("Headless GPU context dropped");
    }
}
