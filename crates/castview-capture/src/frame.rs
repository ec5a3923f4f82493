//! Frame storage owned by sources and frames handed to consumers.

use std::time::Instant;

use bytes::Bytes;

use crate::device::PixelFormat;

/// Pixel memory owned by a capture source.
///
/// Sources lend the contents as `&[u8]` from `grab_frame`; the borrow ends at
/// the next grab, which is free to overwrite or resize the buffer.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new(format: PixelFormat) -> Self {
        Self {
            data: Vec::new(),
            width: 0,
            height: 0,
            format,
        }
    }

    /// Create a zeroed buffer sized for one frame.
    pub fn with_size(width: u32, height: u32, format: PixelFormat) -> Self {
        let mut buffer = Self::new(format);
        buffer.resize(width, height, format);
        buffer
    }

    /// Resize for new geometry. Contents are zeroed only if the length changes.
    pub fn resize(&mut self, width: u32, height: u32, format: PixelFormat) {
        let len = format.frame_len(width, height);
        if self.data.len() != len {
            self.data.clear();
            self.data.resize(len, 0);
        }
        self.width = width;
        self.height = height;
        self.format = format;
    }

    /// Overwrite the buffer with `src`, truncated to the current frame length.
    ///
    /// Returns the number of bytes copied.
    pub fn copy_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Replace the contents with `src`, taking its length.
    ///
    /// Pair with [`FrameBuffer::set_geometry`] once the frame's dimensions
    /// are known.
    pub fn load(&mut self, src: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(src);
    }

    /// Record the geometry of the current contents without touching them.
    pub fn set_geometry(&mut self, width: u32, height: u32, format: PixelFormat) {
        self.width = width;
        self.height = height;
        self.format = format;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Timestamp for a grabbed frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was grabbed.
    pub capture_time: Instant,

    /// Time since the grabber started, in microseconds.
    pub elapsed_us: u64,
}

impl CaptureTimestamp {
    /// Create a timestamp relative to `start_time`.
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        let elapsed_us = capture_time.duration_since(start_time).as_micros() as u64;

        Self {
            capture_time,
            elapsed_us,
        }
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_us / 1000
    }
}

/// A frame copied out of a source, ready to cross threads.
#[derive(Debug, Clone)]
pub struct GrabbedFrame {
    /// Pixel data, top-left origin.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Pixel layout.
    pub format: PixelFormat,

    /// Grab timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number.
    pub sequence: u64,
}

impl GrabbedFrame {
    /// Validate that the data length matches the declared geometry.
    pub fn is_valid(&self) -> bool {
        self.data.len() == self.format.frame_len(self.width, self.height)
    }
}
