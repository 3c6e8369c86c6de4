use super::camera::PerspectiveCamera;
use super::RenderBackend;
use winit::window::Window;

/// Whatever hosts the render surface and can report its size.
pub trait SurfaceHost {
    /// Logical size of the container, or `None` when it is not attached or
    /// has no area.
    fn container_size(&self) -> Option<(u32, u32)>;
}

impl SurfaceHost for Window {
    fn container_size(&self) -> Option<(u32, u32)> {
        let size = self.inner_size().to_logical::<f64>(self.scale_factor());
        let (width, height) = (size.width.round() as u32, size.height.round() as u32);
        (width > 0 && height > 0).then_some((width, height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    Applied { width: u32, height: u32 },
    Deferred,
}

/// Keeps the output size and camera aspect in step with the host container.
#[derive(Debug, Default)]
pub struct ViewportSync {
    last: Option<(u32, u32)>,
}

impl ViewportSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_applied(&self) -> Option<(u32, u32)> {
        self.last
    }

    pub fn resize<B: RenderBackend + ?Sized>(
        &mut self,
        host: &dyn SurfaceHost,
        backend: &mut B,
        camera: &mut PerspectiveCamera,
    ) -> ResizeOutcome {
        let Some((width, height)) = host.container_size().filter(|&(w, h)| w > 0 && h > 0) else {
            log::debug!("Resize deferred: container not available");
            return ResizeOutcome::Deferred;
        };

        backend.set_size(width, height);
        camera.set_aspect(width as f32 / height as f32);
        camera.update_projection_matrix();
        self.last = Some((width, height));

        log::debug!("Viewport resized to {}x{}", width, height);
        ResizeOutcome::Applied { width, height }
    }
}
