//! Synthetic pointer source.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{DeviceId, DeviceInfo, DeviceKind, PixelFormat};
use crate::error::CaptureError;
use crate::frame::FrameBuffer;
use crate::{CaptureResult, CaptureSource, Grab};

const CURSOR_DEVICE_ID: DeviceId = DeviceId(0);

#[derive(Debug)]
struct Pointer {
    x: i32,
    y: i32,
    hotspot: (i32, i32),
    image: Vec<u8>,
    width: u32,
    height: u32,
    /// Bumped whenever the image changes.
    serial: u64,
}

/// Moves the pointer or swaps its image from any thread.
#[derive(Debug, Clone)]
pub struct CursorHandle {
    pointer: Arc<Mutex<Pointer>>,
}

impl CursorHandle {
    /// Move the hotspot to screen coordinates `(x, y)`.
    pub fn move_to(&self, x: i32, y: i32) {
        let mut pointer = self.pointer.lock();
        pointer.x = x;
        pointer.y = y;
    }

    /// Replace the sprite image. `image` must be RGBA.
    pub fn set_image(&self, image: Vec<u8>, width: u32, height: u32, hotspot: (i32, i32)) {
        let mut pointer = self.pointer.lock();
        pointer.image = image;
        pointer.width = width;
        pointer.height = height;
        pointer.hotspot = hotspot;
        pointer.serial += 1;
    }

    pub fn position(&self) -> (i32, i32) {
        let pointer = self.pointer.lock();
        (pointer.x, pointer.y)
    }
}

/// A cursor source backed by an in-memory RGBA sprite.
///
/// A grab yields a frame only when the pointer moved or its image changed
/// since the previous grab.
pub struct CursorSprite {
    pointer: Arc<Mutex<Pointer>>,
    device: Option<DeviceInfo>,
    buffer: FrameBuffer,
    /// Position and serial reported by the last frame.
    last: Option<(i32, i32, u64)>,
}

impl CursorSprite {
    /// Create a sprite with its hotspot at the top-left corner.
    pub fn new(image: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pointer: Arc::new(Mutex::new(Pointer {
                x: 0,
                y: 0,
                hotspot: (0, 0),
                image,
                width,
                height,
                serial: 0,
            })),
            device: None,
            buffer: FrameBuffer::new(PixelFormat::Rgba),
            last: None,
        }
    }

    /// A 12x19 arrow: white body, black outline, soft shadow.
    pub fn arrow() -> Self {
        const W: u32 = 12;
        const H: u32 = 19;
        let mut image = vec![0u8; (W * H * 4) as usize];

        for y in 0..H {
            // Left edge runs straight down, the diagonal widens by one per row.
            let span = (y + 1).min(W);
            for x in 0..span {
                let i = ((y * W + x) * 4) as usize;
                let edge = x == 0 || x + 1 == span || y + 1 == H;
                let px: [u8; 4] = if edge { [0, 0, 0, 255] } else { [255, 255, 255, 255] };
                image[i..i + 4].copy_from_slice(&px);
            }
            if span < W {
                let i = ((y * W + span) * 4) as usize;
                image[i..i + 4].copy_from_slice(&[0, 0, 0, 96]);
            }
        }

        Self::new(image, W, H)
    }

    /// Handle for moving the pointer after the sprite is handed off.
    pub fn handle(&self) -> CursorHandle {
        CursorHandle {
            pointer: Arc::clone(&self.pointer),
        }
    }

    fn device_info(pointer: &Pointer) -> DeviceInfo {
        DeviceInfo::new(
            CURSOR_DEVICE_ID,
            "Pointer",
            DeviceKind::Cursor,
            PixelFormat::Rgba,
            pointer.width,
            pointer.height,
        )
        .at(pointer.x - pointer.hotspot.0, pointer.y - pointer.hotspot.1)
    }
}

impl CaptureSource for CursorSprite {
    fn enumerate_devices(&mut self) -> CaptureResult<Vec<DeviceInfo>> {
        Ok(vec![Self::device_info(&self.pointer.lock())])
    }

    fn bind_device(&mut self, info: &DeviceInfo) -> CaptureResult<()> {
        self.unbind_device();
        if info.id != CURSOR_DEVICE_ID {
            return Err(CaptureError::DeviceNotFound(info.name.clone()));
        }
        self.device = Some(Self::device_info(&self.pointer.lock()));
        Ok(())
    }

    fn unbind_device(&mut self) {
        self.device = None;
        self.last = None;
    }

    fn current_device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    fn grab_frame(&mut self) -> Grab<'_> {
        if self.device.is_none() {
            return Grab::Lost(CaptureError::NotBound);
        }

        let pointer = self.pointer.lock();
        let current = (pointer.x, pointer.y, pointer.serial);
        if self.last == Some(current) {
            return Grab::Unchanged;
        }

        if self.last.map(|(_, _, serial)| serial) != Some(pointer.serial) {
            self.buffer
                .resize(pointer.width, pointer.height, PixelFormat::Rgba);
            self.buffer.copy_from(&pointer.image);
        }
        self.device = Some(Self::device_info(&pointer));
        drop(pointer);

        self.last = Some(current);
        Grab::Frame(self.buffer.as_slice())
    }
}
