pub mod frame_loop;
mod input;
pub mod timing;
pub mod viewer;

use crate::assets::FsAssetSource;
use crate::render::{RenderError, WgpuBackend};
use crate::settings::ViewerSettings;
use glam::Vec2;
use input::{map_button, wheel_steps};
use timing::TitleOverlay;
use viewer::{Viewer, ViewerError};

use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to create window: {0}")]
    CreateWindow(#[from] winit::error::OsError),
    #[error("startup failed: {0}")]
    Startup(#[from] ViewerError),
    #[error("frame failed: {0}")]
    Frame(#[from] RenderError),
}

pub struct App {
    settings: ViewerSettings,
    runtime: tokio::runtime::Runtime,
    window: Option<Arc<Window>>,
    viewer: Option<Viewer<WgpuBackend>>,
    /// Last cursor position in logical pixels.
    cursor: Vec2,
    failure: Option<AppError>,
}

impl App {
    fn new(settings: ViewerSettings, runtime: tokio::runtime::Runtime) -> Self {
        Self {
            settings,
            runtime,
            window: None,
            viewer: None,
            cursor: Vec2::ZERO,
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: AppError) {
        log::error!("{err}");
        self.failure = Some(err);
        event_loop.exit();
    }

    fn start(&self, window: &Arc<Window>) -> Result<Viewer<WgpuBackend>, AppError> {
        let backend = WgpuBackend::new(Arc::clone(window)).map_err(ViewerError::from)?;
        let source = FsAssetSource::new(&self.settings.assets.root);
        let overlay = TitleOverlay::new(Arc::clone(window), self.settings.window_title.clone());

        let viewer = self.runtime.block_on(Viewer::initialize(
            &source,
            &self.settings,
            backend,
            window.as_ref(),
            Box::new(overlay),
            window.as_ref(),
        ))?;
        Ok(viewer)
    }

    /// Pointer events only drive the controller bound to this window.
    fn controls_window(&self, window_id: WindowId) -> bool {
        self.viewer
            .as_ref()
            .is_some_and(|viewer| viewer.controller().surface().0 == u64::from(window_id))
    }

    fn handle_resize(&mut self) {
        if let (Some(window), Some(viewer)) = (&self.window, &mut self.viewer) {
            let outcome = viewer.resize(window.as_ref());
            log::debug!("Resize: {:?}", outcome);
            window.request_redraw();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let result = match (&self.window, &mut self.viewer) {
            (Some(window), Some(viewer)) => viewer.tick(window.as_ref(), Instant::now()),
            _ => return,
        };
        if let Err(err) = result {
            self.fail(event_loop, AppError::Frame(err));
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let [width, height] = self.settings.window_size;
        let window_attrs = WindowAttributes::default()
            .with_title(self.settings.window_title.clone())
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.fail(event_loop, AppError::CreateWindow(err));
                return;
            }
        };
        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        match self.start(&window) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(err) => self.fail(event_loop, err),
        }
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                    && event.state == ElementState::Pressed
                {
                    log::info!("Escape pressed, shutting down...");
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                self.handle_resize();
            }
            WindowEvent::CursorMoved { position, .. } => {
                let scale_factor = self
                    .window
                    .as_ref()
                    .map(|window| window.scale_factor())
                    .unwrap_or(1.0);
                let logical = position.to_logical::<f32>(scale_factor);
                self.cursor = Vec2::new(logical.x, logical.y);
                if !self.controls_window(window_id) {
                    return;
                }
                if let Some(viewer) = &mut self.viewer {
                    let height = viewer.surface_height();
                    viewer.controller_mut().pointer_move(self.cursor, height);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if !self.controls_window(window_id) {
                    return;
                }
                let cursor = self.cursor;
                if let Some(viewer) = &mut self.viewer {
                    match (state, map_button(button)) {
                        (ElementState::Pressed, Some(button)) => {
                            viewer.controller_mut().pointer_down(button, cursor)
                        }
                        (ElementState::Released, Some(_)) => viewer.controller_mut().pointer_up(),
                        (_, None) => {}
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if !self.controls_window(window_id) {
                    return;
                }
                if let Some(viewer) = &mut self.viewer {
                    viewer.controller_mut().wheel(wheel_steps(delta));
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
            }
            _ => {}
        }
    }
}

pub fn run() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let settings = ViewerSettings::default();
    log::info!("orbitview: drag to orbit, right-drag to pan, scroll to zoom, ESC to exit");
    match serde_json::to_string_pretty(&settings) {
        Ok(json) => log::debug!("Settings: {json}"),
        Err(err) => log::debug!("Settings could not be serialized: {err}"),
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    let event_loop = EventLoop::new()?;
    // frames are requested by the frame loop itself
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(settings, runtime);
    event_loop.run_app(&mut app)?;

    if let Some(err) = app.failure.take() {
        return Err(err);
    }
    log::info!("Goodbye!");
    Ok(())
}
