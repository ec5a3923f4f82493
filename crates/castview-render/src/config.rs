//! Render control settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest accepted refresh rate.
pub const MIN_FPS: f64 = 0.0001;

/// Render control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Target refresh rate.
    pub fps: f64,

    /// Colour behind the frame quad.
    pub clear_color: [f32; 4],

    /// Capacity of the event channel; events are dropped while it is full.
    pub event_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            clear_color: [0.2, 0.3, 0.3, 1.0],
            event_capacity: 64,
        }
    }
}

/// Tick interval in microseconds for `fps`, or `None` below [`MIN_FPS`].
pub fn interval_us(fps: f64) -> Option<u64> {
    if fps.is_nan() || fps < MIN_FPS {
        return None;
    }
    Some(((1_000_000.0 / fps) as u64).max(1))
}

impl RenderConfig {
    /// Tick interval, falling back to 30 fps for an out-of-range rate.
    pub fn interval(&self) -> Duration {
        Duration::from_micros(interval_us(self.fps).unwrap_or(33_333))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval() {
        assert_eq!(RenderConfig::default().interval(), Duration::from_micros(33_333));
    }

    #[test]
    fn test_interval_bounds() {
        assert_eq!(interval_us(60.0), Some(16_666));
        assert_eq!(interval_us(0.00005), None);
        assert_eq!(interval_us(-1.0), None);
        assert_eq!(interval_us(f64::NAN), None);
        assert_eq!(interval_us(10_000_000.0), Some(1));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RenderConfig = serde_json::from_str(r#"{ "fps": 60.0 }"#).unwrap();
        assert_eq!(config.fps, 60.0);
        assert_eq!(config.clear_color, [0.2, 0.3, 0.3, 1.0]);
        assert_eq!(config.event_capacity, 64);
    }
}
