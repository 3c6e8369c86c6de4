use super::{CubeTextureHandle, RenderBackend, RenderError};
use crate::assets::EnvironmentImage;
use glam::Vec3;
use image::{Rgba, RgbaImage};
use std::f32::consts::PI;
use std::sync::Arc;

/// Cube faces in upload order (+X, -X, +Y, -Y, +Z, -Z).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// World direction through face coordinates `u`, `v` in [-1, 1], with
    /// `v` growing downwards in the face image.
    pub fn direction(self, u: f32, v: f32) -> Vec3 {
        let dir = match self {
            CubeFace::PositiveX => Vec3::new(1.0, -v, -u),
            CubeFace::NegativeX => Vec3::new(-1.0, -v, u),
            CubeFace::PositiveY => Vec3::new(u, 1.0, v),
            CubeFace::NegativeY => Vec3::new(u, -1.0, -v),
            CubeFace::PositiveZ => Vec3::new(u, -v, 1.0),
            CubeFace::NegativeZ => Vec3::new(-u, -v, -1.0),
        };
        dir.normalize()
    }
}

/// A baked environment living on the backend. The CPU faces are released
/// once uploaded; only the size and the backend texture remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeMap {
    face_size: u32,
    handle: CubeTextureHandle,
}

impl CubeMap {
    pub fn face_size(&self) -> u32 {
        self.face_size
    }

    pub fn handle(&self) -> CubeTextureHandle {
        self.handle
    }

    #[cfg(test)]
    pub(crate) fn from_parts(face_size: u32, handle: CubeTextureHandle) -> Self {
        Self { face_size, handle }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error("environment image has no pixels")]
    EmptySource,
    #[error("cube map upload failed: {0}")]
    Upload(#[from] RenderError),
}

pub struct EnvironmentBaker;

impl EnvironmentBaker {
    /// Resamples the equirectangular image into a cube whose face size is
    /// the source height, then uploads it once.
    pub fn bake<B: RenderBackend + ?Sized>(
        image: &EnvironmentImage,
        backend: &mut B,
    ) -> Result<Arc<CubeMap>, BakeError> {
        let source = image.pixels();
        if source.width() == 0 || source.height() == 0 {
            return Err(BakeError::EmptySource);
        }
        let face_size = source.height();

        let faces = render_faces(source, face_size);
        let handle = backend.upload_cube_map(face_size, &faces)?;
        drop(faces);
        log::info!(
            "Baked {}x{} environment into cube map, face size {}",
            source.width(),
            source.height(),
            face_size
        );

        Ok(Arc::new(CubeMap { face_size, handle }))
    }
}

fn render_faces(source: &RgbaImage, face_size: u32) -> [RgbaImage; 6] {
    CubeFace::ALL.map(|face| render_face(source, face, face_size))
}

fn render_face(source: &RgbaImage, face: CubeFace, size: u32) -> RgbaImage {
    let scale = 2.0 / size as f32;
    RgbaImage::from_fn(size, size, |x, y| {
        let u = (x as f32 + 0.5) * scale - 1.0;
        let v = (y as f32 + 0.5) * scale - 1.0;
        sample_equirect(source, face.direction(u, v))
    })
}

/// Longitude/latitude lookup with horizontal wrap and vertical clamp.
fn sample_equirect(source: &RgbaImage, dir: Vec3) -> Rgba<u8> {
    let (width, height) = source.dimensions();
    let u = dir.z.atan2(dir.x) / (2.0 * PI) + 0.5;
    let v = dir.y.clamp(-1.0, 1.0).asin() / PI + 0.5;

    let fx = u * width as f32 - 0.5;
    let fy = (1.0 - v) * height as f32 - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;

    let wrap_x = |x: f32| (x as i64).rem_euclid(width as i64) as u32;
    let clamp_y = |y: f32| (y.max(0.0) as u32).min(height - 1);
    let (xa, xb) = (wrap_x(x0), wrap_x(x0 + 1.0));
    let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));

    let p00 = source.get_pixel(xa, ya).0;
    let p10 = source.get_pixel(xb, ya).0;
    let p01 = source.get_pixel(xa, yb).0;
    let p11 = source.get_pixel(xb, yb).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f32 * (1.0 - tx) + p10[c] as f32 * tx;
        let bottom = p01[c] as f32 * (1.0 - tx) + p11[c] as f32 * tx;
        out[c] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::{render_faces, sample_equirect, BakeError, CubeFace, CubeMap, EnvironmentBaker};
    use crate::assets::EnvironmentImage;
    use crate::render::testing::{gradient_environment, BackendCall, RecordingBackend};
    use glam::Vec3;
    use image::{Rgba, RgbaImage};

    #[test]
    fn face_centers_point_along_their_axis() {
        let expected = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, axis) in CubeFace::ALL.into_iter().zip(expected) {
            assert!((face.direction(0.0, 0.0) - axis).length() < 1e-6, "{face:?}");
        }
    }

    #[test]
    fn adjacent_faces_share_edges() {
        // Right edge of +Z meets left edge of +X.
        let a = CubeFace::PositiveZ.direction(1.0, 0.0);
        let b = CubeFace::PositiveX.direction(-1.0, 0.0);
        assert!((a - b).length() < 1e-6);
        // Top edge of +Z meets bottom edge of +Y.
        let a = CubeFace::PositiveZ.direction(0.0, -1.0);
        let b = CubeFace::PositiveY.direction(0.0, 1.0);
        assert!((a - b).length() < 1e-6);
    }

    #[test]
    fn poles_sample_top_and_bottom_rows() {
        let mut source = RgbaImage::from_pixel(8, 4, Rgba([0, 0, 255, 255]));
        for x in 0..8 {
            source.put_pixel(x, 0, Rgba([255, 0, 0, 255]));
            source.put_pixel(x, 1, Rgba([255, 0, 0, 255]));
        }
        assert_eq!(sample_equirect(&source, Vec3::Y), Rgba([255, 0, 0, 255]));
        assert_eq!(sample_equirect(&source, Vec3::NEG_Y), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn horizontal_seam_wraps_instead_of_clamping() {
        let mut source = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        for y in 0..2 {
            source.put_pixel(0, y, Rgba([200, 0, 0, 255]));
            source.put_pixel(3, y, Rgba([100, 0, 0, 255]));
        }
        // -X sits exactly on the u = 0 / u = 1 seam.
        let seam = sample_equirect(&source, Vec3::NEG_X);
        assert_eq!(seam.0[0], 150);
    }

    #[test]
    fn faces_are_square_at_source_height() {
        let source = gradient_environment(64, 32);
        for face in render_faces(source.pixels(), 32) {
            assert_eq!(face.dimensions(), (32, 32));
        }
    }

    #[test]
    fn face_size_equals_source_height() {
        let (mut backend, journal) = RecordingBackend::new();
        let cube = EnvironmentBaker::bake(&gradient_environment(2048, 1024), &mut backend).unwrap();
        assert_eq!(cube.face_size(), 1024);
        assert_eq!(backend.uploaded_face_dimensions(), Some([(1024, 1024); 6]));
        assert_eq!(
            journal.borrow().as_slice(),
            &[BackendCall::UploadCubeMap { face_size: 1024 }]
        );
        assert_eq!(cube.handle(), backend.last_cube_handle().unwrap());
    }

    #[test]
    fn baked_cube_keeps_only_size_and_backend_handle() {
        let (mut backend, _journal) = RecordingBackend::new();
        let cube = EnvironmentBaker::bake(&gradient_environment(512, 256), &mut backend).unwrap();
        let handle = backend.last_cube_handle().unwrap();
        assert_eq!(*cube, CubeMap::from_parts(256, handle));
        assert_eq!(std::mem::size_of::<CubeMap>(), std::mem::size_of::<(u32, u64)>());
    }

    #[test]
    fn empty_source_is_rejected_without_upload() {
        let (mut backend, journal) = RecordingBackend::new();
        let empty = EnvironmentImage::new(RgbaImage::new(0, 0));
        let err = EnvironmentBaker::bake(&empty, &mut backend).unwrap_err();
        assert!(matches!(err, BakeError::EmptySource));
        assert!(journal.borrow().is_empty());
    }

    #[test]
    fn upload_failure_propagates() {
        let (mut backend, _journal) = RecordingBackend::new();
        backend.fail_upload = true;
        let err = EnvironmentBaker::bake(&gradient_environment(8, 4), &mut backend).unwrap_err();
        assert!(matches!(err, BakeError::Upload(_)));
    }
}
