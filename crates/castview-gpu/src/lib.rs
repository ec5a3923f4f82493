//! GPU abstraction for castview.
//!
//! A [`ContextProvider`] creates [`GpuContext`]s; a context owns drawing
//! surfaces and exposes a [`GpuDevice`] for textures, pixel buffers, shader
//! programs and draw calls. Every call on a context must happen on the thread
//! that created it, so neither trait object is `Send`.
//!
//! The [`headless`] backend implements both traits in memory and records the
//! calls it receives.

mod error;
pub mod headless;
mod types;

pub use error::GpuError;
pub use types::{
    BufferId, Location, NativeWindow, PixelType, ProgramId, SurfaceId, TexelFormat,
    TextureAttributes, TextureFilter, TextureId, TextureTarget, TextureWrap,
    ERROR_INVALID_OPERATION, ERROR_INVALID_VALUE,
};

/// Result type for GPU operations.
pub type GpuResult<T> = Result<T, GpuError>;

/// Texture, buffer, program and draw operations on the current context.
pub trait GpuDevice {
    /// Allocate texture storage of the given size.
    fn create_texture(
        &mut self,
        attributes: &TextureAttributes,
        width: u32,
        height: u32,
    ) -> GpuResult<TextureId>;

    /// Upload `pixels` to the top-left `width` x `height` region.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        attributes: &TextureAttributes,
        width: u32,
        height: u32,
        pixels: &[u8],
    );

    fn delete_texture(&mut self, texture: TextureId);

    /// Allocate a pixel transfer buffer of `size` bytes.
    fn create_pixel_buffer(&mut self, size: usize) -> GpuResult<BufferId>;

    /// Fill the start of a pixel buffer. Writing past its end raises
    /// [`ERROR_INVALID_VALUE`].
    fn write_pixel_buffer(&mut self, buffer: BufferId, data: &[u8]);

    /// Upload the top-left region of a texture from a pixel buffer,
    /// reading from `offset` bytes into the buffer.
    fn upload_texture_from_buffer(
        &mut self,
        texture: TextureId,
        attributes: &TextureAttributes,
        width: u32,
        height: u32,
        buffer: BufferId,
        offset: usize,
    );

    fn delete_pixel_buffer(&mut self, buffer: BufferId);

    /// Compile and link a program from vertex and fragment sources.
    fn compile_program(&mut self, vertex: &str, fragment: &str) -> GpuResult<ProgramId>;

    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<Location>;

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<Location>;

    fn delete_program(&mut self, program: ProgramId);

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    fn clear(&mut self, color: [f32; 4]);

    fn use_program(&mut self, program: ProgramId);

    /// Point an attribute at client-side float data.
    fn vertex_attrib(&mut self, location: Location, components: u32, data: &[f32]);

    fn uniform_matrix4(&mut self, location: Location, matrix: &[f32; 16]);

    /// Bind a texture to a texture unit.
    fn bind_texture(&mut self, unit: u32, texture: TextureId, target: TextureTarget);

    /// Point a sampler uniform at a texture unit.
    fn uniform_sampler(&mut self, location: Location, unit: u32);

    fn draw_triangle_strip(&mut self, vertex_count: u32);

    /// Read and reset the pending error flag.
    fn take_error(&mut self) -> Option<u32>;
}

/// A graphics context and its surfaces.
pub trait GpuContext {
    /// Create a surface presenting into a native window.
    fn create_window_surface(&mut self, window: NativeWindow) -> GpuResult<SurfaceId>;

    /// Create an offscreen surface.
    fn create_offscreen_surface(&mut self, width: u32, height: u32) -> GpuResult<SurfaceId>;

    /// Bind `surface` for drawing and reading.
    fn make_current(&mut self, surface: SurfaceId) -> GpuResult<()>;

    /// Present a window surface. Returns false if presentation failed.
    fn swap_buffers(&mut self, surface: SurfaceId) -> bool;

    /// Destroy a surface.
    fn release_surface(&mut self, surface: SurfaceId);

    /// Device operations on this context.
    fn device(&mut self) -> &mut dyn GpuDevice;
}

/// Creates contexts on the calling thread.
pub trait ContextProvider: Send + Sync {
    fn create_context(&self) -> GpuResult<Box<dyn GpuContext>>;
}
