use super::frame_loop::{FrameContext, FrameLoop, FrameScheduler};
use super::timing::{FrameStats, PerformanceMonitor, StatsMode, StatsOverlay};
use crate::assets::{load_scene_assets, AssetError, AssetSource};
use crate::render::{
    BakeError, EnvironmentBaker, OrbitController, PerspectiveCamera, RenderBackend, RenderError,
    ResizeOutcome, ShadowMapType, SurfaceHost, ToneMapping, ViewportSync,
};
use crate::scene::{AmbientLight, DirectionalLight, Light, MaterialKey, Scene, SceneBuilder};
use crate::settings::ViewerSettings;
use glam::Vec3;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Bake(#[from] BakeError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// A composed, running viewer. Only [`Viewer::initialize`] produces one, and
/// only after both assets have loaded and the scene is complete.
pub struct Viewer<B: RenderBackend> {
    backend: B,
    camera: PerspectiveCamera,
    controller: OrbitController,
    viewport: ViewportSync,
    scene: Scene,
    monitor: PerformanceMonitor,
    frame_loop: FrameLoop,
}

impl<B: RenderBackend> Viewer<B> {
    pub async fn initialize<S: AssetSource>(
        source: &S,
        settings: &ViewerSettings,
        mut backend: B,
        host: &dyn SurfaceHost,
        overlay: Box<dyn StatsOverlay>,
        scheduler: &dyn FrameScheduler,
    ) -> Result<Self, ViewerError> {
        let loaded = load_scene_assets(source, &settings.assets).await?;

        backend.set_pixel_ratio(settings.renderer.pixel_ratio);
        backend.enable_shadow_map(ShadowMapType::PcfSoft);
        backend.set_tone_mapping(ToneMapping::AcesFilmic {
            exposure: settings.renderer.exposure,
        });
        backend.set_output_gamma(settings.renderer.output_gamma);

        let mut camera = PerspectiveCamera::new(&settings.camera);
        let mut viewport = ViewportSync::new();
        if viewport.resize(host, &mut backend, &mut camera) == ResizeOutcome::Deferred {
            log::warn!("Surface has no size yet; projection waits for the first resize");
        }
        let controller = OrbitController::new(backend.surface_id(), Vec3::ZERO);

        let key_light = DirectionalLight::key(&settings.key_light, controller.target());
        let builder = SceneBuilder::new(
            loaded.model,
            settings.model_scale,
            MaterialKey::new(settings.transparent_material.clone()),
        )
        .with_light("key light", Light::Directional(key_light))
        .with_light(
            "ambient light",
            Light::Ambient(AmbientLight::from_settings(&settings.ambient_light)),
        );

        let cube_map = EnvironmentBaker::bake(&loaded.environment, &mut backend)?;
        let scene = builder.finish(cube_map);
        log::info!(
            "Scene composed with {} material(s), {} px environment",
            scene.materials().len(),
            scene.background().face_size()
        );

        let monitor = PerformanceMonitor::new(StatsMode::default(), overlay);
        let mut frame_loop = FrameLoop::new();
        frame_loop.start(scheduler, Instant::now());

        Ok(Self {
            backend,
            camera,
            controller,
            viewport,
            scene,
            monitor,
            frame_loop,
        })
    }

    pub fn tick(
        &mut self,
        scheduler: &dyn FrameScheduler,
        now: Instant,
    ) -> Result<Option<FrameStats>, RenderError> {
        let ctx = FrameContext {
            controller: &mut self.controller,
            camera: &mut self.camera,
            backend: &mut self.backend,
            scene: &self.scene,
            monitor: &mut self.monitor,
        };
        self.frame_loop.tick(ctx, scheduler, now)
    }

    pub fn resize(&mut self, host: &dyn SurfaceHost) -> ResizeOutcome {
        self.viewport.resize(host, &mut self.backend, &mut self.camera)
    }

    /// Height of the last applied viewport in logical pixels, 0 if none.
    pub fn surface_height(&self) -> f32 {
        self.viewport
            .last_applied()
            .map(|(_, height)| height as f32)
            .unwrap_or(0.0)
    }

    pub fn controller(&self) -> &OrbitController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut OrbitController {
        &mut self.controller
    }

    #[cfg(test)]
    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    #[cfg(test)]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub fn loop_state(&self) -> super::frame_loop::FrameLoopState {
        self.frame_loop.state()
    }
}
