//! Render control: one GPU context, one thread, many render targets.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use castview_gpu::{ContextProvider, GpuContext, GpuResult, SurfaceId};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::cache::ResourceCache;
use crate::config::{interval_us, RenderConfig};
use crate::error::RenderError;
use crate::events::RenderEvent;
use crate::metrics::{RenderMetrics, RenderStats};
use crate::state::RenderState;
use crate::target::{DrawOutcome, FrameContext, RenderTarget, RendererId};
use crate::texture::Texture;
use crate::RenderResult;

struct Entry {
    target: Arc<dyn RenderTarget>,
    state: RenderState,
    setup_failures: u64,
    draw_errors: u64,
}

#[derive(Default)]
struct RendererTable {
    entries: BTreeMap<RendererId, Entry>,
    /// True while the render thread owns a context and will service
    /// release requests.
    loop_active: bool,
}

struct ControlShared {
    table: Mutex<RendererTable>,
    /// Signalled whenever entries leave the table or the loop exits.
    removed: Condvar,
    running: AtomicBool,
    interval_us: AtomicU64,
    cache: ResourceCache<Texture>,
    provider: Arc<dyn ContextProvider>,
    metrics: RenderMetrics,
    event_tx: Sender<RenderEvent>,
    clear_color: [f32; 4],
}

impl ControlShared {
    fn publish(&self, event: RenderEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!("Render event dropped: {}", e);
        }
    }
}

/// Drives every registered [`RenderTarget`] from a single render thread.
///
/// The thread creates the GPU context through the [`ContextProvider`] and is
/// the only thread that ever touches it. Registration and removal may be
/// called from any thread.
pub struct RenderControl {
    shared: Arc<ControlShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    event_rx: Receiver<RenderEvent>,
}

impl RenderControl {
    pub fn new(provider: Arc<dyn ContextProvider>, config: RenderConfig) -> Self {
        let (event_tx, event_rx) = bounded(config.event_capacity.max(1));
        let interval = config.interval().as_micros() as u64;

        Self {
            shared: Arc::new(ControlShared {
                table: Mutex::new(RendererTable::default()),
                removed: Condvar::new(),
                running: AtomicBool::new(false),
                interval_us: AtomicU64::new(interval),
                cache: ResourceCache::new(),
                provider,
                metrics: RenderMetrics::new(),
                event_tx,
                clear_color: config.clear_color,
            }),
            thread: Mutex::new(None),
            event_rx,
        }
    }

    /// Spawn the render thread.
    #[instrument(name = "render_start", skip(self))]
    pub fn start(&self) -> RenderResult<()> {
        let mut thread_slot = self.thread.lock();
        if let Some(handle) = thread_slot.take() {
            if self.shared.table.lock().loop_active && !handle.is_finished() {
                *thread_slot = Some(handle);
                return Err(RenderError::AlreadyRunning);
            }
            // The previous loop exited on its own: context failure or a panic.
            if handle.join().is_err() {
                error!("Previous render thread panicked");
            }
        }

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.table.lock().loop_active = true;

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("castview-render".to_string())
            .spawn(move || render_loop(shared));

        match spawned {
            Ok(handle) => {
                *thread_slot = Some(handle);
                info!("Render control started");
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.table.lock().loop_active = false;
                self.shared.removed.notify_all();
                Err(e.into())
            }
        }
    }

    /// Stop the render thread and wait for it to release everything.
    #[instrument(name = "render_stop", skip(self))]
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Render thread panicked");
                let mut table = self.shared.table.lock();
                table.loop_active = false;
                self.shared.removed.notify_all();
            }
            info!("Render control stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst) && self.shared.table.lock().loop_active
    }

    /// Change the tick rate. Rates below 0.0001 fps are ignored.
    pub fn set_fps(&self, fps: f64) {
        match interval_us(fps) {
            Some(us) => {
                self.shared.interval_us.store(us, Ordering::Relaxed);
                debug!(fps, interval_us = us, "Render rate changed");
            }
            None => warn!(fps, "Ignoring out-of-range render rate"),
        }
    }

    pub fn fps(&self) -> f64 {
        1_000_000.0 / self.shared.interval_us.load(Ordering::Relaxed) as f64
    }

    /// Register a target. It is set up on the next tick.
    #[instrument(name = "render_add", skip_all, fields(renderer = %target.id()))]
    pub fn add_renderer(&self, target: Arc<dyn RenderTarget>) -> RenderResult<()> {
        let id = target.id();
        let mut table = self.shared.table.lock();
        if table.entries.contains_key(&id) {
            return Err(RenderError::AlreadyRegistered(id));
        }
        table.entries.insert(
            id,
            Entry {
                target,
                state: RenderState::Idle,
                setup_failures: 0,
                draw_errors: 0,
            },
        );
        debug!(count = table.entries.len(), "Renderer added");
        Ok(())
    }

    /// Unregister a target, blocking until the render thread has released
    /// its GPU resources.
    ///
    /// Must not be called from inside a [`RenderTarget`] method.
    #[instrument(name = "render_remove", skip(self))]
    pub fn remove_renderer(&self, id: RendererId) -> RenderResult<()> {
        let mut table = self.shared.table.lock();
        let loop_active = table.loop_active;

        let entry = table
            .entries
            .get_mut(&id)
            .ok_or(RenderError::RendererNotFound(id))?;

        if !loop_active || !entry.state.holds_gpu() {
            table.entries.remove(&id);
            debug!("Renderer removed");
            return Ok(());
        }
        entry.state = RenderState::Releasing;

        while table.loop_active && table.entries.contains_key(&id) {
            self.shared.removed.wait(&mut table);
        }
        table.entries.remove(&id);
        debug!("Renderer removed after release");
        Ok(())
    }

    /// Unregister every target, blocking until all are released.
    #[instrument(name = "render_clear", skip(self))]
    pub fn clear_renderers(&self) {
        let mut table = self.shared.table.lock();
        if table.loop_active {
            table.entries.retain(|_, entry| entry.state.holds_gpu());
            for entry in table.entries.values_mut() {
                entry.state = RenderState::Releasing;
            }
            while table.loop_active && !table.entries.is_empty() {
                self.shared.removed.wait(&mut table);
            }
        }
        table.entries.clear();
        debug!("Renderers cleared");
    }

    pub fn renderer_state(&self, id: RendererId) -> Option<RenderState> {
        self.shared.table.lock().entries.get(&id).map(|e| e.state)
    }

    pub fn renderer_count(&self) -> usize {
        self.shared.table.lock().entries.len()
    }

    /// Receiver for control events. Events are dropped while it is full.
    pub fn events(&self) -> Receiver<RenderEvent> {
        self.event_rx.clone()
    }

    pub fn metrics(&self) -> &RenderMetrics {
        &self.shared.metrics
    }

    pub fn stats(&self) -> RenderStats {
        self.shared.metrics.snapshot()
    }

    /// Textures currently parked in the shared pool.
    pub fn pooled_textures(&self) -> usize {
        self.shared.cache.pooled()
    }
}

impl Drop for RenderControl {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_context(
    provider: &dyn ContextProvider,
) -> GpuResult<(Box<dyn GpuContext>, SurfaceId)> {
    let mut context = provider.create_context()?;
    let background = context.create_offscreen_surface(1, 1)?;
    if let Err(e) = context.make_current(background) {
        context.release_surface(background);
        return Err(e);
    }
    Ok((context, background))
}

fn render_loop(shared: Arc<ControlShared>) {
    debug!("Render loop starting");

    let (mut context, background) = match open_context(shared.provider.as_ref()) {
        Ok(opened) => opened,
        Err(e) => {
            error!("Failed to create GPU context: {}", e);
            shared.publish(RenderEvent::ContextFailed {
                message: e.to_string(),
            });
            let mut table = shared.table.lock();
            table.loop_active = false;
            shared.removed.notify_all();
            return;
        }
    };

    shared.metrics.start();
    shared.publish(RenderEvent::LoopStarted);
    info!("Render loop running");

    while shared.running.load(Ordering::SeqCst) {
        let tick_start = Instant::now();

        {
            let mut table = shared.table.lock();
            let mut ctx = FrameContext::new(
                context.as_mut(),
                background,
                &shared.cache,
                &shared.metrics,
                shared.clear_color,
            );
            run_tick(&shared, &mut table, &mut ctx);
        }
        shared.metrics.record_tick();

        let interval = Duration::from_micros(shared.interval_us.load(Ordering::Relaxed));
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        } else {
            shared.metrics.record_overrun();
            trace!(elapsed_us = elapsed.as_micros() as u64, "Render tick overran");
        }
    }

    {
        let mut table = shared.table.lock();
        let mut ctx = FrameContext::new(
            context.as_mut(),
            background,
            &shared.cache,
            &shared.metrics,
            shared.clear_color,
        );

        for (id, entry) in table.entries.iter_mut() {
            match entry.state {
                RenderState::Ready => {
                    entry.target.release(&mut ctx);
                    entry.state = RenderState::Idle;
                }
                RenderState::Releasing => {
                    entry.target.release(&mut ctx);
                    entry.state = RenderState::Dead;
                    shared.publish(RenderEvent::RendererReleased { id: *id });
                }
                RenderState::Idle | RenderState::Dead => {}
            }
        }
        table.entries.retain(|_, entry| !entry.state.is_dead());

        let pooled = shared.cache.pooled();
        shared.cache.purge(|mut texture| texture.destroy(ctx.device()));
        debug!(pooled, "Texture pool purged");

        table.loop_active = false;
        shared.removed.notify_all();
    }

    context.release_surface(background);
    let stats = shared.metrics.snapshot();
    shared.metrics.stop();
    drop(context);

    info!(
        ticks = stats.ticks,
        presented = stats.presented,
        overruns = stats.overruns,
        "Render loop stopped"
    );
    shared.publish(RenderEvent::LoopStopped { stats });
}

fn run_tick(shared: &ControlShared, table: &mut RendererTable, ctx: &mut FrameContext<'_>) {
    for (id, entry) in table.entries.iter_mut() {
        if !entry.state.is_idle() {
            continue;
        }
        match entry.target.setup(ctx) {
            Ok(()) => {
                entry.state = RenderState::Ready;
                entry.setup_failures = 0;
                shared.publish(RenderEvent::RendererReady { id: *id });
            }
            Err(e) => {
                shared.metrics.record_setup_failure();
                entry.setup_failures += 1;
                if entry.setup_failures == 1 || entry.setup_failures % 100 == 0 {
                    warn!(
                        renderer = %id,
                        attempts = entry.setup_failures,
                        "Renderer setup failed: {}", e
                    );
                    shared.publish(RenderEvent::SetupFailed {
                        id: *id,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    for (id, entry) in table.entries.iter_mut() {
        if !entry.state.is_ready() {
            continue;
        }
        match entry.target.draw(ctx) {
            Ok(DrawOutcome::Presented) => shared.metrics.record_presented(),
            Ok(DrawOutcome::Skipped) => shared.metrics.record_skipped(),
            Err(e) => {
                shared.metrics.record_draw_error();
                entry.draw_errors += 1;
                if entry.draw_errors == 1 || entry.draw_errors % 100 == 0 {
                    warn!(renderer = %id, errors = entry.draw_errors, "Draw failed: {}", e);
                }
            }
        }
    }

    let mut released = 0usize;
    for (id, entry) in table.entries.iter_mut() {
        if !entry.state.is_releasing() {
            continue;
        }
        entry.target.release(ctx);
        entry.state = RenderState::Dead;
        shared.publish(RenderEvent::RendererReleased { id: *id });
        released += 1;
    }

    if released > 0 {
        table.entries.retain(|_, entry| !entry.state.is_dead());
        shared.removed.notify_all();
        debug!(released, remaining = table.entries.len(), "Renderers released");
    }
}
