//! Synthetic test-pattern screen.

use tracing::debug;

use crate::device::{DeviceId, DeviceInfo, DeviceKind, PixelFormat};
use crate::error::CaptureError;
use crate::frame::FrameBuffer;
use crate::{CaptureResult, CaptureSource, Grab};

const PATTERN_DEVICE_ID: DeviceId = DeviceId(0);

const BARS: [[u8; 4]; 8] = [
    [255, 255, 255, 255],
    [255, 255, 0, 255],
    [0, 255, 255, 255],
    [0, 255, 0, 255],
    [255, 0, 255, 255],
    [255, 0, 0, 255],
    [0, 0, 255, 255],
    [0, 0, 0, 255],
];

/// A screen source producing vertical colour bars that scroll one column per
/// grab. With animation off, only the first grab after binding yields a frame.
pub struct PatternSource {
    width: u32,
    height: u32,
    position: (i32, i32),
    animated: bool,
    device: Option<DeviceInfo>,
    buffer: FrameBuffer,
    phase: u32,
    emitted: bool,
}

impl PatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            position: (0, 0),
            animated: true,
            device: None,
            buffer: FrameBuffer::new(PixelFormat::Rgba),
            phase: 0,
            emitted: false,
        }
    }

    /// Toggle scrolling.
    pub fn set_animated(&mut self, animated: bool) {
        self.animated = animated;
    }

    /// Move the virtual screen. Reported through `current_device`.
    pub fn set_position(&mut self, x: i32, y: i32) {
        self.position = (x, y);
        if let Some(device) = self.device.as_mut() {
            device.x = x;
            device.y = y;
        }
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::new(
            PATTERN_DEVICE_ID,
            "Test Pattern",
            DeviceKind::Synthetic,
            PixelFormat::Rgba,
            self.width,
            self.height,
        )
        .at(self.position.0, self.position.1)
    }

    fn render(&mut self) {
        let width = self.width.max(1);
        let bar_width = (width / BARS.len() as u32).max(1);
        let row_len = self.width as usize * 4;
        if row_len == 0 {
            return;
        }

        let data = self.buffer.as_mut_slice();
        let (first_row, rest) = data.split_at_mut(row_len.min(data.len()));
        for (x, px) in first_row.chunks_exact_mut(4).enumerate() {
            let column = (x as u32 + self.phase) % width;
            let bar = ((column / bar_width) as usize).min(BARS.len() - 1);
            px.copy_from_slice(&BARS[bar]);
        }
        for row in rest.chunks_exact_mut(row_len) {
            row.copy_from_slice(first_row);
        }
    }
}

impl CaptureSource for PatternSource {
    fn enumerate_devices(&mut self) -> CaptureResult<Vec<DeviceInfo>> {
        Ok(vec![self.device_info()])
    }

    fn bind_device(&mut self, info: &DeviceInfo) -> CaptureResult<()> {
        self.unbind_device();
        if info.id != PATTERN_DEVICE_ID {
            return Err(CaptureError::DeviceNotFound(info.name.clone()));
        }

        self.buffer
            .resize(self.width, self.height, PixelFormat::Rgba);
        self.device = Some(self.device_info());
        self.phase = 0;
        self.emitted = false;
        debug!(width = self.width, height = self.height, "Test pattern bound");
        Ok(())
    }

    fn unbind_device(&mut self) {
        self.device = None;
    }

    fn current_device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    fn grab_frame(&mut self) -> Grab<'_> {
        if self.device.is_none() {
            return Grab::Lost(CaptureError::NotBound);
        }
        if self.emitted && !self.animated {
            return Grab::Unchanged;
        }

        self.render();
        if self.animated {
            self.phase = self.phase.wrapping_add(1);
        }
        self.emitted = true;
        Grab::Frame(self.buffer.as_slice())
    }
}
