mod camera;
mod environment;
mod orbit;
mod viewport;
pub mod wgpu_backend;

#[cfg(test)]
pub mod testing;

pub use camera::{Aspect, PerspectiveCamera};
pub use environment::{BakeError, CubeMap, EnvironmentBaker};
pub use orbit::{OrbitController, PointerButton};
pub use viewport::{ResizeOutcome, SurfaceHost, ViewportSync};
pub use wgpu_backend::WgpuBackend;

use crate::scene::Scene;
use image::RgbaImage;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create render surface: {0}")]
    SurfaceCreateFailed(String),
    #[error("no compatible GPU adapter found")]
    AdapterUnavailable,
    #[error("failed to create GPU device: {0}")]
    DeviceCreateFailed(String),
    #[error("render surface error: {0}")]
    Surface(String),
    #[error("camera has no projection yet (aspect unset)")]
    CameraNotReady,
    #[error("cube map face size {size} exceeds device limit {limit}")]
    CubeMapTooLarge { size: u32, limit: u32 },
    #[error("unknown cube map handle {0:?}")]
    UnknownCubeMap(CubeTextureHandle),
}

/// Identifies the output surface an input controller is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CubeTextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMapType {
    #[allow(dead_code)]
    Basic,
    #[allow(dead_code)]
    Pcf,
    PcfSoft,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToneMapping {
    None,
    #[allow(dead_code)]
    Linear { exposure: f32 },
    AcesFilmic { exposure: f32 },
}

/// Frame-pacing hook some presentation backends expose.
pub trait FrameSync {
    fn sync(&mut self, time: Duration);
}

/// Capability surface of the rendering engine the viewer drives.
pub trait RenderBackend {
    fn surface_id(&self) -> SurfaceId;

    /// Output size in logical pixels; the backend scales by the pixel ratio.
    fn set_size(&mut self, width: u32, height: u32);

    fn set_pixel_ratio(&mut self, ratio: f32);

    fn enable_shadow_map(&mut self, kind: ShadowMapType);

    fn set_tone_mapping(&mut self, tone_mapping: ToneMapping);

    fn set_output_gamma(&mut self, gamma: f32);

    /// One-time upload of six square faces, ordered +X, -X, +Y, -Y, +Z, -Z.
    fn upload_cube_map(
        &mut self,
        face_size: u32,
        faces: &[RgbaImage; 6],
    ) -> Result<CubeTextureHandle, RenderError>;

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), RenderError>;

    fn time_sync(&mut self) -> Option<&mut dyn FrameSync> {
        None
    }
}
