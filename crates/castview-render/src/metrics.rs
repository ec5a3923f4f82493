//! Render loop counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Point-in-time view of [`RenderMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderStats {
    /// Loop iterations run.
    pub ticks: u64,

    /// Draws that presented a frame.
    pub presented: u64,

    /// Draws with nothing new to show.
    pub skipped: u64,

    /// Draws that returned an error.
    pub draw_errors: u64,

    /// Setups that returned an error.
    pub setup_failures: u64,

    /// Ticks that ran longer than the interval.
    pub overruns: u64,

    /// Textures taken from the pool.
    pub texture_fetches: u64,

    /// Presented frames per second since the loop started.
    pub presented_fps: f32,

    /// Seconds since the loop started.
    pub uptime_seconds: u64,
}

/// Counters updated by the render thread.
pub struct RenderMetrics {
    start_time: RwLock<Option<Instant>>,
    ticks: AtomicU64,
    presented: AtomicU64,
    skipped: AtomicU64,
    draw_errors: AtomicU64,
    setup_failures: AtomicU64,
    overruns: AtomicU64,
    texture_fetches: AtomicU64,
}

impl RenderMetrics {
    pub fn new() -> Self {
        Self {
            start_time: RwLock::new(None),
            ticks: AtomicU64::new(0),
            presented: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            draw_errors: AtomicU64::new(0),
            setup_failures: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            texture_fetches: AtomicU64::new(0),
        }
    }

    /// Mark the start of the loop.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    /// Mark the end of the loop.
    pub fn stop(&self) {
        *self.start_time.write() = None;
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_presented(&self) {
        self.presented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_draw_error(&self) {
        self.draw_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_setup_failure(&self) {
        self.setup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_texture_fetch(&self) {
        self.texture_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> RenderStats {
        let presented = self.presented.load(Ordering::Relaxed);

        let elapsed = self.start_time.read().map(|start| start.elapsed());
        let presented_fps = match elapsed {
            Some(elapsed) if elapsed.as_secs_f32() > 0.0 => {
                presented as f32 / elapsed.as_secs_f32()
            }
            _ => 0.0,
        };

        RenderStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            presented,
            skipped: self.skipped.load(Ordering::Relaxed),
            draw_errors: self.draw_errors.load(Ordering::Relaxed),
            setup_failures: self.setup_failures.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            texture_fetches: self.texture_fetches.load(Ordering::Relaxed),
            presented_fps,
            uptime_seconds: elapsed.map_or(0, |e| e.as_secs()),
        }
    }
}

impl Default for RenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = RenderMetrics::new();
        metrics.record_tick();
        metrics.record_tick();
        metrics.record_presented();
        metrics.record_overrun();
        metrics.record_texture_fetch();

        let stats = metrics.snapshot();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.presented, 1);
        assert_eq!(stats.overruns, 1);
        assert_eq!(stats.texture_fetches, 1);
        assert_eq!(stats.presented_fps, 0.0);
        assert_eq!(stats.uptime_seconds, 0);
    }
}
