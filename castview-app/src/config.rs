//! Demo configuration, loaded from an optional JSON file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use castview_capture::CaptureConfig;
use castview_render::{RenderConfig, ScaleType};
use serde::{Deserialize, Serialize};

/// Synthetic screen settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,

    /// Scroll the colour bars every frame.
    pub animated: bool,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            animated: true,
        }
    }
}

/// One output window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Native window handle handed to the GPU backend.
    pub window: u64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub scale_type: ScaleType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub render: RenderConfig,
    pub screen: ScreenConfig,
    pub windows: Vec<WindowConfig>,

    /// How long the demo runs before tearing down.
    pub run_seconds: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            render: RenderConfig::default(),
            screen: ScreenConfig::default(),
            windows: vec![
                WindowConfig {
                    window: 1,
                    width: 1280,
                    height: 720,
                    scale_type: ScaleType::ScaleFit,
                },
                WindowConfig {
                    window: 2,
                    width: 400,
                    height: 400,
                    scale_type: ScaleType::CropFit,
                },
            ],
            run_seconds: 5.0,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or use the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn run_duration(&self) -> Duration {
        if self.run_seconds.is_finite() && self.run_seconds > 0.0 {
            Duration::from_secs_f64(self.run_seconds)
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "render": { "fps": 60.0 },
                "windows": [{ "window": 9, "width": 320, "height": 240 }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.render.fps, 60.0);
        assert_eq!(config.render.clear_color, [0.2, 0.3, 0.3, 1.0]);
        assert_eq!(config.capture.fps, 30.0);
        assert_eq!(config.windows.len(), 1);
        assert_eq!(config.windows[0].scale_type, ScaleType::ScaleFit);
        assert_eq!(config.screen.width, 640);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/castview.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_run_duration_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.run_seconds = -3.0;
        assert_eq!(config.run_duration(), Duration::ZERO);
        config.run_seconds = f64::INFINITY;
        assert_eq!(config.run_duration(), Duration::ZERO);
        config.run_seconds = 0.5;
        assert_eq!(config.run_duration(), Duration::from_millis(500));
    }
}
