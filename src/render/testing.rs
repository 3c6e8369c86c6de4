//! Test doubles for the render capability surface and its hosts.

use super::viewport::SurfaceHost;
use super::{
    CubeMap, CubeTextureHandle, FrameSync, PerspectiveCamera, RenderBackend, RenderError,
    ShadowMapType, SurfaceId, ToneMapping,
};
use crate::app::frame_loop::FrameScheduler;
use crate::assets::EnvironmentImage;
use crate::scene::{
    Material, MaterialKey, MaterialLibrary, MeshData, MeshId, MeshNode, Model, Node, Scene,
};
use image::{Rgba, RgbaImage};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    SetSize(u32, u32),
    SetPixelRatio(f32),
    EnableShadowMap(ShadowMapType),
    SetToneMapping(ToneMapping),
    SetOutputGamma(f32),
    UploadCubeMap { face_size: u32 },
    TimeSync(Duration),
    Render { meshes: usize, focus: f32 },
}

pub type Journal = Rc<RefCell<Vec<BackendCall>>>;

pub struct RecordingSync {
    journal: Journal,
}

impl FrameSync for RecordingSync {
    fn sync(&mut self, time: Duration) {
        self.journal.borrow_mut().push(BackendCall::TimeSync(time));
    }
}

/// Records every capability call in order.
pub struct RecordingBackend {
    journal: Journal,
    sync: Option<RecordingSync>,
    next_handle: u64,
    last_handle: Option<CubeTextureHandle>,
    uploaded_faces: Option<[(u32, u32); 6]>,
    pub fail_render: bool,
    pub fail_upload: bool,
}

impl RecordingBackend {
    pub fn new() -> (Self, Journal) {
        let journal = Journal::default();
        let backend = Self {
            journal: Rc::clone(&journal),
            sync: None,
            next_handle: 1,
            last_handle: None,
            uploaded_faces: None,
            fail_render: false,
            fail_upload: false,
        };
        (backend, journal)
    }

    pub fn with_time_sync(mut self) -> Self {
        self.sync = Some(RecordingSync {
            journal: Rc::clone(&self.journal),
        });
        self
    }

    pub fn last_cube_handle(&self) -> Option<CubeTextureHandle> {
        self.last_handle
    }

    /// Dimensions of each face passed to the last upload.
    pub fn uploaded_face_dimensions(&self) -> Option<[(u32, u32); 6]> {
        self.uploaded_faces
    }

    fn record(&self, call: BackendCall) {
        self.journal.borrow_mut().push(call);
    }
}

impl RenderBackend for RecordingBackend {
    fn surface_id(&self) -> SurfaceId {
        SurfaceId(7)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.record(BackendCall::SetSize(width, height));
    }

    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.record(BackendCall::SetPixelRatio(ratio));
    }

    fn enable_shadow_map(&mut self, kind: ShadowMapType) {
        self.record(BackendCall::EnableShadowMap(kind));
    }

    fn set_tone_mapping(&mut self, tone_mapping: ToneMapping) {
        self.record(BackendCall::SetToneMapping(tone_mapping));
    }

    fn set_output_gamma(&mut self, gamma: f32) {
        self.record(BackendCall::SetOutputGamma(gamma));
    }

    fn upload_cube_map(
        &mut self,
        face_size: u32,
        faces: &[RgbaImage; 6],
    ) -> Result<CubeTextureHandle, RenderError> {
        if self.fail_upload {
            return Err(RenderError::CubeMapTooLarge {
                size: face_size,
                limit: 0,
            });
        }
        self.record(BackendCall::UploadCubeMap { face_size });
        self.uploaded_faces = Some(std::array::from_fn(|i| faces[i].dimensions()));
        let handle = CubeTextureHandle(self.next_handle);
        self.next_handle += 1;
        self.last_handle = Some(handle);
        Ok(handle)
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), RenderError> {
        if camera.projection_matrix().is_none() {
            return Err(RenderError::CameraNotReady);
        }
        if self.fail_render {
            return Err(RenderError::Surface("device lost".to_string()));
        }
        let mut meshes = 0;
        scene.walk_meshes(|_, _| meshes += 1);
        self.record(BackendCall::Render {
            meshes,
            focus: camera.focus(),
        });
        Ok(())
    }

    fn time_sync(&mut self) -> Option<&mut dyn FrameSync> {
        self.sync.as_mut().map(|sync| sync as &mut dyn FrameSync)
    }
}

/// Host whose container size can be changed between calls.
pub struct FakeHost {
    size: Cell<Option<(u32, u32)>>,
}

impl FakeHost {
    pub fn new(size: Option<(u32, u32)>) -> Self {
        Self {
            size: Cell::new(size),
        }
    }

    pub fn set(&self, size: Option<(u32, u32)>) {
        self.size.set(size);
    }
}

impl SurfaceHost for FakeHost {
    fn container_size(&self) -> Option<(u32, u32)> {
        self.size.get()
    }
}

#[derive(Default)]
pub struct CountingScheduler {
    requests: Cell<usize>,
}

impl CountingScheduler {
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl FrameScheduler for CountingScheduler {
    fn request_frame(&self) {
        self.requests.set(self.requests.get() + 1);
    }
}

/// A flat model with one triangle mesh per material name, in order.
pub fn test_model(material_names: &[&str]) -> Model {
    let mut materials = MaterialLibrary::new();
    let mut meshes = Vec::new();
    let mut root = Node::group("model");
    for name in material_names {
        let material = materials.push(Material::new(MaterialKey::new(*name)));
        let mut mesh = MeshData {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: Vec::new(),
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            indices: vec![0, 1, 2],
        };
        mesh.ensure_normals();
        meshes.push(mesh);
        let id = MeshId(meshes.len() - 1);
        root = root.with_child(Node::mesh(format!("{name}_mesh"), MeshNode::new(id, material)));
    }
    Model {
        root,
        meshes,
        materials,
        textures: Vec::new(),
    }
}

pub fn solid_cube_map(face_size: u32) -> Arc<CubeMap> {
    Arc::new(CubeMap::from_parts(face_size, CubeTextureHandle(0)))
}

/// Horizontal hue ramp, vertically darkening towards the bottom.
pub fn gradient_environment(width: u32, height: u32) -> EnvironmentImage {
    EnvironmentImage::new(RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = 255 - (y * 255 / height.max(1)) as u8;
        Rgba([r, g, 64, 255])
    }))
}
