//! Primary source with a blended cursor overlay.

use tracing::{debug, instrument, warn};

use crate::device::{DeviceInfo, PixelFormat};
use crate::frame::FrameBuffer;
use crate::{CaptureResult, CaptureSource, Grab};

/// Blend an RGBA cursor image onto an RGBA destination in place.
///
/// `offset` is the cursor's top-left corner relative to the destination.
/// Only the intersection of the cursor box with the destination bounds is
/// touched. Fully transparent cursor pixels are skipped and opaque ones
/// replace the destination; anything in between is blended as
/// `c + (d * (255 - a) + 127) / 255`, clamped to 255. Touched pixels always
/// end up with alpha 255.
pub fn blend_cursor(
    dest: &mut [u8],
    dest_size: (u32, u32),
    cursor: &[u8],
    cursor_size: (u32, u32),
    offset: (i32, i32),
) {
    let (dw, dh) = (dest_size.0 as i64, dest_size.1 as i64);
    let (cw, ch) = (cursor_size.0 as i64, cursor_size.1 as i64);

    if dest.len() < (dw * dh * 4) as usize || cursor.len() < (cw * ch * 4) as usize {
        debug!(
            dest_len = dest.len(),
            cursor_len = cursor.len(),
            "Buffer shorter than declared geometry, skipping blend"
        );
        return;
    }

    let (ox, oy) = (offset.0 as i64, offset.1 as i64);
    let x0 = ox.max(0);
    let y0 = oy.max(0);
    let x1 = (ox + cw).min(dw);
    let y1 = (oy + ch).min(dh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    for y in y0..y1 {
        for x in x0..x1 {
            let s = (((y - oy) * cw + (x - ox)) * 4) as usize;
            let d = ((y * dw + x) * 4) as usize;
            let src = &cursor[s..s + 4];
            let alpha = src[3] as u32;

            match alpha {
                0 => continue,
                255 => dest[d..d + 4].copy_from_slice(src),
                _ => {
                    let inv = 255 - alpha;
                    for c in 0..3 {
                        let blended = src[c] as u32 + (dest[d + c] as u32 * inv + 127) / 255;
                        dest[d + c] = blended.min(255) as u8;
                    }
                    dest[d + 3] = 255;
                }
            }
        }
    }
}

/// A capture source that overlays a cursor source on a primary source.
///
/// Only RGBA primaries are blended; other formats pass through untouched.
pub struct CompositeCapture {
    primary: Box<dyn CaptureSource>,
    cursor: Box<dyn CaptureSource>,
    cursor_enabled: bool,
    cursor_bound: bool,
    /// Clean copy of the latest primary frame.
    base: FrameBuffer,
    has_base: bool,
    /// Latest cursor image.
    cursor_image: FrameBuffer,
    has_cursor: bool,
    output: FrameBuffer,
    dirty: bool,
    device: Option<DeviceInfo>,
}

impl CompositeCapture {
    /// Create a composite over `primary` with `cursor` as the overlay.
    pub fn new(primary: Box<dyn CaptureSource>, cursor: Box<dyn CaptureSource>) -> Self {
        Self {
            primary,
            cursor,
            cursor_enabled: true,
            cursor_bound: false,
            base: FrameBuffer::new(PixelFormat::Rgba),
            has_base: false,
            cursor_image: FrameBuffer::new(PixelFormat::Rgba),
            has_cursor: false,
            output: FrameBuffer::new(PixelFormat::Rgba),
            dirty: false,
            device: None,
        }
    }

    /// Enable or disable the cursor overlay. Takes effect on the next grab.
    pub fn set_cursor_enabled(&mut self, enabled: bool) {
        if self.cursor_enabled != enabled {
            debug!(enabled, "Cursor overlay toggled");
            self.cursor_enabled = enabled;
            self.dirty = true;
        }
    }

    pub fn is_cursor_enabled(&self) -> bool {
        self.cursor_enabled
    }

    fn bind_cursor(&mut self) {
        self.cursor_bound = false;
        self.has_cursor = false;

        let devices = match self.cursor.enumerate_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Cursor enumeration failed, overlay disabled: {}", e);
                return;
            }
        };

        let Some(info) = devices.first() else {
            warn!("No cursor device available, overlay disabled");
            return;
        };

        match self.cursor.bind_device(info) {
            Ok(()) => self.cursor_bound = true,
            Err(e) => warn!("Cursor bind failed, overlay disabled: {}", e),
        }
    }

    /// Grab the cursor, returning whether the overlay changed.
    ///
    /// Sets `usable` to false when the overlay must be skipped this frame.
    fn grab_cursor(&mut self, usable: &mut bool) -> bool {
        if !self.cursor_enabled || !self.cursor_bound {
            *usable = false;
            return false;
        }

        let changed = match self.cursor.grab_frame() {
            Grab::Frame(data) => {
                self.cursor_image.load(data);
                true
            }
            Grab::Unchanged => false,
            Grab::Lost(e) => {
                debug!("Cursor grab failed, skipping overlay: {}", e);
                *usable = false;
                return false;
            }
        };

        if changed {
            if let Some(info) = self.cursor.current_device() {
                self.cursor_image
                    .set_geometry(info.width, info.height, PixelFormat::Rgba);
            }
            self.has_cursor = true;
        }
        changed
    }
}

impl CaptureSource for CompositeCapture {
    fn enumerate_devices(&mut self) -> CaptureResult<Vec<DeviceInfo>> {
        self.primary.enumerate_devices()
    }

    #[instrument(name = "composite_bind", skip(self, info), fields(device = %info.name))]
    fn bind_device(&mut self, info: &DeviceInfo) -> CaptureResult<()> {
        self.unbind_device();
        self.primary.bind_device(info)?;
        self.device = self.primary.current_device().cloned();
        self.bind_cursor();
        self.dirty = true;
        Ok(())
    }

    fn unbind_device(&mut self) {
        if self.device.take().is_some() {
            self.primary.unbind_device();
            self.cursor.unbind_device();
        }
        self.cursor_bound = false;
        self.has_base = false;
        self.has_cursor = false;
    }

    fn start_device(&mut self) -> CaptureResult<()> {
        self.primary.start_device()?;
        if self.cursor_bound {
            if let Err(e) = self.cursor.start_device() {
                warn!("Cursor start failed, overlay disabled: {}", e);
                self.cursor_bound = false;
            }
        }
        Ok(())
    }

    fn stop_device(&mut self) -> CaptureResult<()> {
        if self.cursor_bound {
            if let Err(e) = self.cursor.stop_device() {
                warn!("Cursor stop failed: {}", e);
            }
        }
        self.primary.stop_device()
    }

    fn current_device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    fn grab_frame(&mut self) -> Grab<'_> {
        let primary_changed = match self.primary.grab_frame() {
            Grab::Frame(data) => {
                self.base.load(data);
                true
            }
            Grab::Unchanged => false,
            Grab::Lost(e) => return Grab::Lost(e),
        };

        if primary_changed {
            // Geometry may move between grabs; track the source's latest.
            if let Some(info) = self.primary.current_device() {
                self.base.set_geometry(info.width, info.height, info.format);
                self.device = Some(info.clone());
            }
            self.has_base = true;
        }

        let mut overlay = true;
        let cursor_changed = self.grab_cursor(&mut overlay);

        if !self.has_base || !(primary_changed || cursor_changed || self.dirty) {
            return Grab::Unchanged;
        }
        self.dirty = false;

        self.output
            .resize(self.base.width(), self.base.height(), self.base.format());
        self.output.copy_from(self.base.as_slice());

        let blendable = self.base.format() == PixelFormat::Rgba;
        if overlay && self.has_cursor && blendable {
            if let (Some(primary), Some(cursor)) =
                (self.device.as_ref(), self.cursor.current_device())
            {
                blend_cursor(
                    self.output.as_mut_slice(),
                    (self.base.width(), self.base.height()),
                    self.cursor_image.as_slice(),
                    (self.cursor_image.width(), self.cursor_image.height()),
                    (cursor.x - primary.x, cursor.y - primary.y),
                );
            }
        }

        Grab::Frame(self.output.as_slice())
    }
}
