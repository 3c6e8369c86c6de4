use super::timing::{FrameStats, PerformanceMonitor};
use crate::render::{Aspect, OrbitController, PerspectiveCamera, RenderBackend, RenderError};
use crate::scene::Scene;
use std::time::Instant;
use winit::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLoopState {
    Idle,
    Running,
}

/// Asks the host for one more frame callback.
pub trait FrameScheduler {
    fn request_frame(&self);
}

impl FrameScheduler for Window {
    fn request_frame(&self) {
        self.request_redraw();
    }
}

/// Everything one tick touches, borrowed from the viewer for its duration.
pub struct FrameContext<'a, B: RenderBackend + ?Sized> {
    pub controller: &'a mut OrbitController,
    pub camera: &'a mut PerspectiveCamera,
    pub backend: &'a mut B,
    pub scene: &'a Scene,
    pub monitor: &'a mut PerformanceMonitor,
}

#[derive(Debug)]
pub struct FrameLoop {
    state: FrameLoopState,
    started_at: Option<Instant>,
    frames: u64,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoop {
    pub fn new() -> Self {
        Self {
            state: FrameLoopState::Idle,
            started_at: None,
            frames: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> FrameLoopState {
        self.state
    }

    /// Moves `Idle -> Running` and schedules the first frame. Returns false
    /// if the loop was already running.
    pub fn start(&mut self, scheduler: &dyn FrameScheduler, now: Instant) -> bool {
        if self.state == FrameLoopState::Running {
            log::debug!("Frame loop already running, start ignored");
            return false;
        }
        self.state = FrameLoopState::Running;
        self.started_at = Some(now);
        log::info!("Frame loop started");
        scheduler.request_frame();
        true
    }

    /// One frame. Does nothing while idle or while the camera has no aspect
    /// yet; the next resize requests a redraw. A render error stops the tick
    /// before the next frame is scheduled.
    pub fn tick<B: RenderBackend + ?Sized>(
        &mut self,
        ctx: FrameContext<'_, B>,
        scheduler: &dyn FrameScheduler,
        now: Instant,
    ) -> Result<Option<FrameStats>, RenderError> {
        if self.state == FrameLoopState::Idle {
            return Ok(None);
        }
        if ctx.camera.aspect() == Aspect::Unset {
            log::debug!("Viewport has no size yet, skipping frame");
            return Ok(None);
        }

        ctx.controller.update(ctx.camera);
        let focus = ctx.controller.target().distance(ctx.camera.position());
        ctx.camera.set_focus(focus);

        ctx.monitor.begin(now);
        if let Some(sync) = ctx.backend.time_sync() {
            let elapsed = self
                .started_at
                .map(|start| now.saturating_duration_since(start))
                .unwrap_or_default();
            sync.sync(elapsed);
        }
        ctx.backend.render(ctx.scene, ctx.camera)?;
        let stats = ctx.monitor.end(Instant::now().max(now));

        self.frames += 1;
        log::trace!(
            "Frame {} rendered, focus {:.3}",
            self.frames,
            ctx.camera.focus()
        );
        scheduler.request_frame();
        Ok(Some(stats))
    }
}
