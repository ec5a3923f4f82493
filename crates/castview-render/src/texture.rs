//! Pooled GPU texture with a CPU staging buffer.

use std::sync::atomic::{AtomicU64, Ordering};

use castview_gpu::{BufferId, GpuDevice, TextureAttributes, TextureId};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::cache::Cacheable;
use crate::error::RenderError;
use crate::RenderResult;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// GPU-side state of a [`Texture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureHandle {
    /// No GPU storage yet.
    Unallocated,

    /// Storage allocated under this name.
    Allocated(TextureId),
}

impl TextureHandle {
    pub fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated(_))
    }
}

/// A texture whose GPU storage is allocated on first use.
///
/// Pixels staged with [`Texture::upload_pixels`] are sent to the GPU by the
/// next [`Texture::handle`] call on the render thread.
#[derive(Debug)]
pub struct Texture {
    serial: u64,
    width: u32,
    height: u32,
    attributes: TextureAttributes,
    handle: TextureHandle,
    realloc: bool,
    staging: Mutex<Option<Vec<u8>>>,
}

impl Texture {
    pub fn new(width: u32, height: u32, attributes: TextureAttributes) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            attributes,
            handle: TextureHandle::Unallocated,
            realloc: false,
            staging: Mutex::new(None),
        }
    }

    /// Process-unique identity, stable across pooling.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width of the GPU allocation, rounded up to even.
    pub fn gpu_width(&self) -> u32 {
        self.width + (self.width & 1)
    }

    pub fn attributes(&self) -> &TextureAttributes {
        &self.attributes
    }

    pub fn state(&self) -> TextureHandle {
        self.handle
    }

    /// Byte length of one full upload.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.attributes.bytes_per_pixel()
    }

    /// Fraction of the allocation covered by the logical width.
    pub fn coverage(&self) -> f32 {
        match self.gpu_width() {
            0 => 1.0,
            gpu => self.width as f32 / gpu as f32,
        }
    }

    /// Stage pixels for the next `handle` call. Any unconsumed staged frame
    /// is replaced.
    pub fn upload_pixels(&self, pixels: &[u8]) -> RenderResult<()> {
        let expected = self.frame_len();
        if pixels.len() < expected {
            return Err(RenderError::ShortBuffer {
                expected,
                actual: pixels.len(),
            });
        }

        let mut staging = self.staging.lock();
        let buffer = staging.get_or_insert_with(Vec::new);
        buffer.clear();
        buffer.extend_from_slice(&pixels[..expected]);
        Ok(())
    }

    /// Whether staged pixels are waiting for the GPU.
    pub fn has_pending(&self) -> bool {
        self.staging.lock().is_some()
    }

    /// Resize. Storage is reallocated by the next `handle` call and staged
    /// pixels are discarded.
    pub fn set_size(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.realloc = self.handle.is_allocated();
        *self.staging.lock() = None;
    }

    /// GPU name of the texture, allocating storage and flushing staged pixels
    /// as needed.
    pub fn handle(&mut self, device: &mut dyn GpuDevice) -> RenderResult<TextureId> {
        let id = match self.handle {
            TextureHandle::Allocated(id) if !self.realloc => id,
            current => {
                if let TextureHandle::Allocated(old) = current {
                    device.delete_texture(old);
                }
                self.handle = TextureHandle::Unallocated;
                self.realloc = false;

                let id = device.create_texture(&self.attributes, self.gpu_width(), self.height)?;
                trace!(serial = self.serial, ?id, "Texture allocated");
                self.handle = TextureHandle::Allocated(id);
                id
            }
        };

        if let Some(pixels) = self.staging.lock().take() {
            device.upload_texture(id, &self.attributes, self.width, self.height, &pixels);
        }
        Ok(id)
    }

    /// Upload a full frame from a pixel buffer starting at `offset`.
    pub fn upload_from_buffer(
        &mut self,
        device: &mut dyn GpuDevice,
        buffer: BufferId,
        offset: usize,
    ) -> RenderResult<TextureId> {
        let id = self.handle(device)?;
        device.upload_texture_from_buffer(
            id,
            &self.attributes,
            self.width,
            self.height,
            buffer,
            offset,
        );
        Ok(id)
    }

    /// Delete the GPU storage.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if let TextureHandle::Allocated(id) = self.handle {
            device.delete_texture(id);
            trace!(serial = self.serial, ?id, "Texture destroyed");
        }
        self.handle = TextureHandle::Unallocated;
        self.realloc = false;
    }
}

impl Cacheable for Texture {
    type Attributes = TextureAttributes;

    fn create(width: u32, height: u32, attributes: &TextureAttributes) -> Self {
        Self::new(width, height, *attributes)
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn attributes(&self) -> &TextureAttributes {
        &self.attributes
    }

    fn is_cacheable(&self) -> bool {
        self.handle.is_allocated() && !self.realloc
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let TextureHandle::Allocated(id) = self.handle {
            warn!(serial = self.serial, ?id, "Texture dropped with GPU storage still allocated");
        }
    }
}
