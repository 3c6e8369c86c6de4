use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::window::Window;

const FPS_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatsMode {
    #[default]
    Fps,
    #[allow(dead_code)]
    Ms,
}

/// Fixed on-screen place the stats are written to.
pub trait StatsOverlay {
    fn show(&mut self, text: &str);
}

/// Writes stats into the window title after a fixed base title.
pub struct TitleOverlay {
    window: Arc<Window>,
    base_title: String,
}

impl TitleOverlay {
    pub fn new(window: Arc<Window>, base_title: String) -> Self {
        Self { window, base_title }
    }
}

impl StatsOverlay for TitleOverlay {
    fn show(&mut self, text: &str) {
        self.window.set_title(&format!("{} - {}", self.base_title, text));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub frame_ms: f32,
    /// Rolling rate from the last completed window, if any.
    pub fps: Option<f32>,
}

pub struct PerformanceMonitor {
    mode: StatsMode,
    overlay: Box<dyn StatsOverlay>,
    frame_start: Option<Instant>,
    window_start: Option<Instant>,
    window_frames: u32,
    frame_ms: f32,
    fps: Option<f32>,
}

impl PerformanceMonitor {
    pub fn new(mode: StatsMode, overlay: Box<dyn StatsOverlay>) -> Self {
        Self {
            mode,
            overlay,
            frame_start: None,
            window_start: None,
            window_frames: 0,
            frame_ms: 0.0,
            fps: None,
        }
    }

    pub fn begin(&mut self, now: Instant) {
        self.frame_start = Some(now);
        self.window_start.get_or_insert(now);
    }

    pub fn end(&mut self, now: Instant) -> FrameStats {
        let start = self.frame_start.take().unwrap_or(now);
        self.frame_ms = now.saturating_duration_since(start).as_secs_f32() * 1000.0;
        self.window_frames = self.window_frames.saturating_add(1);

        let window_start = *self.window_start.get_or_insert(start);
        let elapsed = now.saturating_duration_since(window_start);
        if elapsed >= FPS_WINDOW {
            self.fps = Some(self.window_frames as f32 / elapsed.as_secs_f32());
            self.window_frames = 0;
            self.window_start = Some(now);
            let text = self.text();
            self.overlay.show(&text);
        }

        FrameStats {
            frame_ms: self.frame_ms,
            fps: self.fps,
        }
    }

    fn text(&self) -> String {
        match self.mode {
            StatsMode::Fps => format!("{:.1} fps", self.fps.unwrap_or(0.0)),
            StatsMode::Ms => format!("{:.2} ms", self.frame_ms),
        }
    }
}
