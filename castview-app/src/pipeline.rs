//! Demo wiring: synthetic screen + cursor -> grabber -> renderers -> render control.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use castview_capture::{
    CaptureSource, CompositeCapture, CursorHandle, CursorSprite, FrameGrabber, GrabbedFrame,
    PatternSource,
};
use castview_gpu::headless::HeadlessProvider;
use castview_gpu::NativeWindow;
use castview_render::{RenderControl, RenderEvent, RenderStats, RenderTarget, Renderer};
use crossbeam_channel::{after, select, tick};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;

/// What the demo reports on exit.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub render: RenderStats,
    pub frames_grabbed: u64,
    pub frames_unchanged: u64,
    pub grabs_lost: u64,
    /// Frames each renderer overwrote before drawing, by window.
    pub replaced_frames: Vec<(u64, u64)>,
    /// GPU textures still alive after shutdown.
    pub leaked_textures: usize,
}

fn build_source(config: &AppConfig) -> Result<(Box<dyn CaptureSource>, CursorHandle)> {
    let mut screen = PatternSource::new(config.screen.width, config.screen.height);
    screen.set_animated(config.screen.animated);

    let cursor = CursorSprite::arrow();
    let pointer = cursor.handle();

    let mut composite = CompositeCapture::new(Box::new(screen), Box::new(cursor));
    composite.set_cursor_enabled(config.capture.cursor_overlay);
    let mut source: Box<dyn CaptureSource> = Box::new(composite);

    let devices = source
        .enumerate_devices()
        .context("Failed to enumerate capture devices")?;
    let device = devices
        .get(config.capture.device_index)
        .with_context(|| format!("No capture device at index {}", config.capture.device_index))?;
    source
        .bind_device(device)
        .with_context(|| format!("Failed to bind {}", device.name))?;
    info!(device = %device.name, width = device.width, height = device.height, "Capture bound");

    Ok((source, pointer))
}

fn deliver(renderers: &[Arc<Renderer>], frame: &GrabbedFrame) {
    for renderer in renderers {
        if renderer.texture_format() != frame.format {
            if let Err(e) = renderer.set_texture_format(frame.format) {
                warn!(renderer = renderer.name(), "Cannot show frame: {}", e);
                continue;
            }
        }
        if let Err(e) = renderer.upload_texture(frame.data.clone(), frame.width, frame.height) {
            warn!(renderer = renderer.name(), "Frame upload rejected: {}", e);
        }
    }
}

/// Pointer position on a circle around the screen centre.
fn orbit(config: &AppConfig, step: u64) -> (i32, i32) {
    let (w, h) = (config.screen.width as f32, config.screen.height as f32);
    let radius = w.min(h) / 3.0;
    let angle = step as f32 * 0.05;
    (
        (w / 2.0 + radius * angle.cos()) as i32,
        (h / 2.0 + radius * angle.sin()) as i32,
    )
}

/// Run the demo for the configured duration and tear everything down.
#[instrument(name = "demo_run", skip_all)]
pub fn run(config: &AppConfig) -> Result<RunSummary> {
    let provider = HeadlessProvider::new();
    let control = RenderControl::new(Arc::new(provider.clone()), config.render.clone());

    let renderers: Vec<Arc<Renderer>> = config
        .windows
        .iter()
        .map(|window| {
            let renderer = Arc::new(Renderer::new(format!("window-{}", window.window)));
            renderer.set_scale_type(window.scale_type);
            renderer.set_output_size(window.width, window.height);
            renderer.bind_window(Some(NativeWindow(window.window)));
            renderer
        })
        .collect();
    for renderer in &renderers {
        control
            .add_renderer(renderer.clone())
            .with_context(|| format!("Failed to register {}", renderer.name()))?;
    }
    control.start().context("Failed to start render control")?;

    let (source, pointer) = build_source(config)?;
    let sinks = renderers.clone();
    let mut grabber = FrameGrabber::spawn(source, config.capture.interval(), move |frame| {
        deliver(&sinks, &frame)
    })
    .context("Failed to start frame grabber")?;

    let events = control.events();
    let deadline = after(config.run_duration());
    let motion = tick(Duration::from_millis(33));
    let report = tick(Duration::from_secs(1));
    let mut step = 0u64;
    let mut running = true;

    while running {
        select! {
            recv(events) -> event => match event {
                Ok(RenderEvent::ContextFailed { message }) => {
                    bail!("GPU context unavailable: {}", message);
                }
                Ok(event) => debug!(?event, "Render event"),
                Err(_) => running = false,
            },
            recv(motion) -> _ => {
                step += 1;
                let (x, y) = orbit(config, step);
                pointer.move_to(x, y);
            }
            recv(report) -> _ => {
                let stats = control.stats();
                info!(
                    presented = stats.presented,
                    fps = stats.presented_fps,
                    overruns = stats.overruns,
                    grabbed = grabber.stats().frames(),
                    "Demo running"
                );
            }
            recv(deadline) -> _ => running = false,
        }
    }

    grabber.stop();
    for renderer in &renderers {
        control
            .remove_renderer(renderer.id())
            .with_context(|| format!("Failed to remove {}", renderer.name()))?;
    }
    control.stop();

    let summary = RunSummary {
        render: control.stats(),
        frames_grabbed: grabber.stats().frames(),
        frames_unchanged: grabber.stats().unchanged(),
        grabs_lost: grabber.stats().lost(),
        replaced_frames: config
            .windows
            .iter()
            .zip(&renderers)
            .map(|(window, renderer)| (window.window, renderer.replaced_frames()))
            .collect(),
        leaked_textures: provider.live_textures(),
    };
    if summary.leaked_textures > 0 {
        warn!(textures = summary.leaked_textures, "Textures outlived the render loop");
    }
    Ok(summary)
}
