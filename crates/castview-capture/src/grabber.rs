//! Producer thread polling a capture source at a fixed rate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use crate::frame::{CaptureTimestamp, GrabbedFrame};
use crate::{CaptureResult, CaptureSource, Grab};

/// Channel capacity for grabbed frames.
pub const FRAME_CHANNEL_CAPACITY: usize = 3;

/// Capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Index into the primary source's enumeration.
    pub device_index: usize,

    /// Grab rate in frames per second.
    pub fps: f64,

    /// Blend the cursor onto the primary image.
    pub cursor_overlay: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            fps: 30.0,
            cursor_overlay: true,
        }
    }
}

impl CaptureConfig {
    /// Polling interval for the configured rate. Non-positive rates fall back
    /// to 30 fps.
    pub fn interval(&self) -> Duration {
        let fps = if self.fps > 0.0 { self.fps } else { 30.0 };
        Duration::from_micros((1_000_000.0 / fps) as u64)
    }
}

/// Counters updated by the grabber thread.
#[derive(Debug, Default)]
pub struct GrabberStats {
    frames: AtomicU64,
    unchanged: AtomicU64,
    lost: AtomicU64,
}

impl GrabberStats {
    /// Frames handed to the sink.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Grabs that reported no change.
    pub fn unchanged(&self) -> u64 {
        self.unchanged.load(Ordering::Relaxed)
    }

    /// Grabs that reported a lost source.
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}

/// Polls a [`CaptureSource`] on its own thread and forwards new frames.
pub struct FrameGrabber {
    should_stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Box<dyn CaptureSource>>>,
    stats: Arc<GrabberStats>,
}

impl FrameGrabber {
    /// Start the source and spawn the polling thread.
    ///
    /// The source must already be bound. `sink` runs on the grabber thread
    /// for every new frame.
    #[instrument(name = "grabber_spawn", skip(source, sink))]
    pub fn spawn<F>(
        mut source: Box<dyn CaptureSource>,
        interval: Duration,
        sink: F,
    ) -> CaptureResult<Self>
    where
        F: FnMut(GrabbedFrame) + Send + 'static,
    {
        source.start_device()?;

        let should_stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(GrabberStats::default());

        let thread = {
            let should_stop = Arc::clone(&should_stop);
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name("castview-grabber".into())
                .spawn(move || grab_loop(source, interval, sink, should_stop, stats))?
        };

        info!("Frame grabber started");
        Ok(Self {
            should_stop,
            thread: Some(thread),
            stats,
        })
    }

    /// Spawn a grabber that forwards frames into a bounded channel.
    ///
    /// Frames are dropped while the channel is full.
    pub fn spawn_channel(
        source: Box<dyn CaptureSource>,
        interval: Duration,
    ) -> CaptureResult<(Self, Receiver<GrabbedFrame>)> {
        let (tx, rx) = crossbeam_channel::bounded(FRAME_CHANNEL_CAPACITY);
        let grabber = Self::spawn(source, interval, move |frame| {
            match tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    debug!("Frame channel full, dropping frame #{}", frame.sequence);
                }
                Err(TrySendError::Disconnected(_)) => {
                    trace!("Frame receiver gone");
                }
            }
        })?;
        Ok((grabber, rx))
    }

    pub fn stats(&self) -> &GrabberStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop polling and hand the (stopped) source back.
    #[instrument(name = "grabber_stop", skip(self))]
    pub fn stop(&mut self) -> Option<Box<dyn CaptureSource>> {
        self.should_stop.store(true, Ordering::SeqCst);
        let handle = self.thread.take()?;

        match handle.join() {
            Ok(source) => {
                info!(
                    frames = self.stats.frames(),
                    lost = self.stats.lost(),
                    "Frame grabber stopped"
                );
                Some(source)
            }
            Err(_) => {
                warn!("Frame grabber thread panicked");
                None
            }
        }
    }
}

impl Drop for FrameGrabber {
    fn drop(&mut self) {
        self.stop();
    }
}

fn grab_loop<F>(
    mut source: Box<dyn CaptureSource>,
    interval: Duration,
    mut sink: F,
    should_stop: Arc<AtomicBool>,
    stats: Arc<GrabberStats>,
) -> Box<dyn CaptureSource>
where
    F: FnMut(GrabbedFrame),
{
    debug!(?interval, "Grab loop starting");

    let start_time = Instant::now();
    let mut sequence: u64 = 0;

    while !should_stop.load(Ordering::SeqCst) {
        let frame_start = Instant::now();

        let data = match source.grab_frame() {
            Grab::Frame(pixels) => Some(Bytes::copy_from_slice(pixels)),
            Grab::Unchanged => {
                stats.unchanged.fetch_add(1, Ordering::Relaxed);
                None
            }
            Grab::Lost(e) => {
                let lost = stats.lost.fetch_add(1, Ordering::Relaxed) + 1;
                if lost == 1 || lost % 100 == 0 {
                    warn!(lost, "Capture source lost: {}", e);
                }
                None
            }
        };

        if let Some(data) = data {
            match source.current_device() {
                Some(info) => {
                    let frame = GrabbedFrame {
                        data,
                        width: info.width,
                        height: info.height,
                        format: info.format,
                        timestamp: CaptureTimestamp::now(start_time),
                        sequence,
                    };
                    sequence += 1;
                    stats.frames.fetch_add(1, Ordering::Relaxed);
                    sink(frame);
                }
                None => warn!("Frame grabbed without a bound device"),
            }
        }

        let elapsed = frame_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    if let Err(e) = source.stop_device() {
        warn!("Failed to stop capture source: {}", e);
    }
    debug!(frames = sequence, "Grab loop stopped");
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternSource;

    fn bound_pattern(animated: bool) -> Box<dyn CaptureSource> {
        let mut source = PatternSource::new(8, 4);
        source.set_animated(animated);
        let devices = source.enumerate_devices().unwrap();
        source.bind_device(&devices[0]).unwrap();
        Box::new(source)
    }

    #[test]
    fn test_config_interval() {
        let config = CaptureConfig {
            fps: 50.0,
            ..Default::default()
        };
        assert_eq!(config.interval(), Duration::from_millis(20));

        let broken = CaptureConfig {
            fps: 0.0,
            ..Default::default()
        };
        assert_eq!(broken.interval(), Duration::from_micros(33_333));
    }

    #[test]
    fn test_channel_delivers_valid_frames() {
        let (mut grabber, rx) =
            FrameGrabber::spawn_channel(bound_pattern(true), Duration::from_millis(1)).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.is_valid());
        assert_eq!((first.width, first.height), (8, 4));
        assert!(second.sequence > first.sequence);

        let source = grabber.stop();
        assert!(source.is_some());
        assert!(!grabber.is_running());
    }

    #[test]
    fn test_static_source_sends_one_frame() {
        let (mut grabber, rx) =
            FrameGrabber::spawn_channel(bound_pattern(false), Duration::from_millis(1)).unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        while grabber.stats().unchanged() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        grabber.stop();

        assert_eq!(grabber.stats().frames(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unbound_source_counts_losses() {
        let source: Box<dyn CaptureSource> = Box::new(PatternSource::new(4, 4));
        let mut grabber = FrameGrabber::spawn(source, Duration::from_millis(1), |_| {}).unwrap();

        while grabber.stats().lost() < 2 {
            thread::sleep(Duration::from_millis(1));
        }
        grabber.stop();
        assert_eq!(grabber.stats().frames(), 0);
    }
}
