//! Capture sources for castview.
//!
//! This crate defines the capability every frame producer implements
//! (enumerate, bind, start, stop, grab), a composite source that blends a
//! cursor overlay onto a primary image, synthetic sources, and a grabber
//! thread that polls a source and hands new frames to a sink.

mod composite;
mod cursor;
mod device;
mod error;
mod frame;
mod grabber;
mod pattern;

pub use composite::{blend_cursor, CompositeCapture};
pub use cursor::{CursorHandle, CursorSprite};
pub use device::{DeviceId, DeviceInfo, DeviceKind, PixelFormat};
pub use error::CaptureError;
pub use frame::{CaptureTimestamp, FrameBuffer, GrabbedFrame};
pub use grabber::{CaptureConfig, FrameGrabber, GrabberStats, FRAME_CHANNEL_CAPACITY};
pub use pattern::PatternSource;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Outcome of a single [`CaptureSource::grab_frame`] call.
///
/// The borrowed pixels stay valid until the next call on the same source.
#[derive(Debug)]
pub enum Grab<'a> {
    /// Nothing changed since the previous grab; the caller must not redraw.
    Unchanged,

    /// A new frame, top-left origin, laid out in the bound device's format.
    Frame(&'a [u8]),

    /// The source is no longer valid and should be re-enumerated or rebound.
    Lost(CaptureError),
}

impl Grab<'_> {
    /// Returns true if this grab produced new pixels.
    pub fn is_frame(&self) -> bool {
        matches!(self, Self::Frame(_))
    }

    /// Returns true if the source reported a fatal error.
    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Lost(_))
    }
}

/// Trait for capture sources.
pub trait CaptureSource: Send {
    /// List the devices this source can currently bind to.
    ///
    /// Each call discards the state of the previous enumeration.
    fn enumerate_devices(&mut self) -> CaptureResult<Vec<DeviceInfo>>;

    /// Bind to a device, unbinding any previous one first.
    fn bind_device(&mut self, info: &DeviceInfo) -> CaptureResult<()>;

    /// Release the current binding. Does nothing when unbound.
    fn unbind_device(&mut self);

    /// Begin active capture.
    fn start_device(&mut self) -> CaptureResult<()> {
        Ok(())
    }

    /// End active capture.
    fn stop_device(&mut self) -> CaptureResult<()> {
        Ok(())
    }

    /// The currently bound device, with its latest geometry.
    fn current_device(&self) -> Option<&DeviceInfo>;

    /// Grab the next frame.
    fn grab_frame(&mut self) -> Grab<'_>;
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn enumerate_devices(&mut self) -> CaptureResult<Vec<DeviceInfo>> {
        (**self).enumerate_devices()
    }

    fn bind_device(&mut self, info: &DeviceInfo) -> CaptureResult<()> {
        (**self).bind_device(info)
    }

    fn unbind_device(&mut self) {
        (**self).unbind_device()
    }

    fn start_device(&mut self) -> CaptureResult<()> {
        (**self).start_device()
    }

    fn stop_device(&mut self) -> CaptureResult<()> {
        (**self).stop_device()
    }

    fn current_device(&self) -> Option<&DeviceInfo> {
        (**self).current_device()
    }

    fn grab_frame(&mut self) -> Grab<'_> {
        (**self).grab_frame()
    }
}
