use super::pipelines::{Layouts, DEPTH_FORMAT, HDR_FORMAT};
use crate::render::RenderError;
use crate::scene::{Material, MaterialKey, MeshData, MeshId, Scene};
use glam::{Mat4, Vec3};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    fn interleave(mesh: &MeshData) -> Vec<Vertex> {
        mesh.positions
            .iter()
            .enumerate()
            .map(|(i, position)| Vertex {
                position: *position,
                normal: mesh.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                uv: mesh.uvs.get(i).copied().unwrap_or([0.0, 0.0]),
            })
            .collect()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub ambient_color: [f32; 4],
    pub tone: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowUniforms {
    pub light_view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    base_color: [f32; 4],
    params: [f32; 4],
    flags: [f32; 4],
}

impl DrawUniforms {
    pub fn new(model: Mat4, material: &Material, receive_shadow: bool) -> Self {
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            base_color: material.base_color,
            params: [
                material.metallic,
                material.roughness,
                flag(receive_shadow),
                flag(material.environment().is_some()),
            ],
            flags: [flag(material.transparent), 0.0, 0.0, 0.0],
        }
    }
}

pub struct Samplers {
    pub linear: wgpu::Sampler,
    pub shadow: wgpu::Sampler,
}

impl Samplers {
    pub fn new(device: &wgpu::Device) -> Self {
        let linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("linear sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        Self { linear, shadow }
    }
}

/// Environment cube on the GPU, with a box-filtered mip chain for rough reflections.
pub struct GpuCubeMap {
    pub view: wgpu::TextureView,
    pub mip_count: u32,
}

impl GpuCubeMap {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        face_size: u32,
        faces: &[RgbaImage; 6],
    ) -> Result<Self, RenderError> {
        let limit = device.limits().max_texture_dimension_2d;
        if face_size == 0 || face_size > limit {
            return Err(RenderError::CubeMapTooLarge {
                size: face_size,
                limit,
            });
        }
        let mip_count = u32::BITS - face_size.leading_zeros();

        // layer-major: every mip of +X, then every mip of -X, ...
        let mut data = Vec::new();
        for face in faces {
            if face.dimensions() != (face_size, face_size) {
                return Err(RenderError::Surface(format!(
                    "cube face is {:?}, expected {face_size}x{face_size}",
                    face.dimensions()
                )));
            }
            data.extend_from_slice(face.as_raw());
            let mut previous: Option<RgbaImage> = None;
            for level in 1..mip_count {
                let size = (face_size >> level).max(1);
                let source = previous.as_ref().unwrap_or(face);
                let next = imageops::resize(source, size, size, FilterType::Triangle);
                data.extend_from_slice(next.as_raw());
                previous = Some(next);
            }
        }

        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("environment cube"),
                size: wgpu::Extent3d {
                    width: face_size,
                    height: face_size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: mip_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("environment cube view"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Ok(Self { view, mip_count })
    }
}

/// Color and depth targets sized to the render resolution.
pub struct RenderTargets {
    pub size: (u32, u32),
    pub hdr: wgpu::TextureView,
    pub depth: wgpu::TextureView,
    pub post_bind_group: wgpu::BindGroup,
}

impl RenderTargets {
    pub fn new(
        device: &wgpu::Device,
        layouts: &Layouts,
        frame_buffer: &wgpu::Buffer,
        samplers: &Samplers,
        size: (u32, u32),
    ) -> Self {
        let extent = wgpu::Extent3d {
            width: size.0,
            height: size.1,
            depth_or_array_layers: 1,
        };
        let hdr = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("hdr target"),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: HDR_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());
        let depth = depth_view(device, "depth target", extent);

        let post_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("post bind group"),
            layout: &layouts.post,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&hdr),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&samplers.linear),
                },
            ],
        });

        Self {
            size,
            hdr,
            depth,
            post_bind_group,
        }
    }
}

fn depth_view(device: &wgpu::Device, label: &str, extent: wgpu::Extent3d) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

pub struct GpuMesh {
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub index_count: u32,
}

/// One mesh node, in [`Scene::walk_meshes`] order.
pub struct DrawItem {
    pub mesh: MeshId,
    pub uniforms: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub transparent: bool,
    pub cast_shadow: bool,
    pub local_center: Vec3,
}

/// Everything uploaded for one [`Scene`]. Built on the first render.
pub struct GpuScene {
    pub meshes: Vec<GpuMesh>,
    pub draws: Vec<DrawItem>,
    pub shadow_map: wgpu::TextureView,
    pub shadow_texel: f32,
    pub frame_bind_group: wgpu::BindGroup,
    pub environment_mips: u32,
}

impl GpuScene {
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &Layouts,
        samplers: &Samplers,
        frame_buffer: &wgpu::Buffer,
        environment: &GpuCubeMap,
        background: &GpuCubeMap,
        scene: &Scene,
    ) -> Self {
        let meshes = scene
            .meshes()
            .iter()
            .map(|mesh| upload_mesh(device, mesh))
            .collect();

        let white = upload_texture(
            device,
            queue,
            "white texture",
            &RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255])),
        );
        let textures: Vec<wgpu::TextureView> = scene
            .textures()
            .iter()
            .map(|image| upload_texture(device, queue, "base color texture", image))
            .collect();

        let fallback = Material::new(MaterialKey::new("default"));
        let mut draws = Vec::new();
        scene.walk_meshes(|world, node| {
            let material = scene.materials().get(node.material).unwrap_or_else(|| {
                log::warn!("Mesh references missing material {:?}", node.material);
                &fallback
            });
            let texture = material
                .base_color_texture
                .and_then(|id| textures.get(id.0))
                .unwrap_or(&white);
            let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("draw uniforms"),
                contents: bytemuck::bytes_of(&DrawUniforms::new(
                    world,
                    material,
                    node.receive_shadow,
                )),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("draw bind group"),
                layout: &layouts.draw,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(texture),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&samplers.linear),
                    },
                ],
            });
            draws.push(DrawItem {
                mesh: node.mesh,
                uniforms,
                bind_group,
                transparent: material.transparent,
                cast_shadow: node.cast_shadow,
                local_center: scene
                    .mesh(node.mesh)
                    .map(MeshData::bounds_center)
                    .unwrap_or(Vec3::ZERO),
            });
        });

        let map_size = scene
            .directional_light()
            .and_then(|light| light.shadow)
            .map(|shadow| shadow.map_size)
            .unwrap_or([1, 1]);
        let shadow_map = depth_view(
            device,
            "shadow map",
            wgpu::Extent3d {
                width: map_size[0].max(1),
                height: map_size[1].max(1),
                depth_or_array_layers: 1,
            },
        );

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout: &layouts.frame,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&shadow_map),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&samplers.shadow),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&environment.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&samplers.linear),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&background.view),
                },
            ],
        });

        log::info!(
            "Uploaded scene: {} meshes, {} draws, {} textures",
            scene.meshes().len(),
            draws.len(),
            scene.textures().len()
        );

        Self {
            meshes,
            draws,
            shadow_map,
            shadow_texel: 1.0 / map_size[0].max(1) as f32,
            frame_bind_group,
            environment_mips: environment.mip_count,
        }
    }
}

fn upload_mesh(device: &wgpu::Device, mesh: &MeshData) -> GpuMesh {
    let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("mesh vertices"),
        contents: bytemuck::cast_slice(&Vertex::interleave(mesh)),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("mesh indices"),
        contents: bytemuck::cast_slice(&mesh.indices),
        usage: wgpu::BufferUsages::INDEX,
    });
    GpuMesh {
        vertices,
        indices,
        index_count: mesh.indices.len() as u32,
    }
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    image: &RgbaImage,
) -> wgpu::TextureView {
    let (width, height) = image.dimensions();
    device
        .create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_raw(),
        )
        .create_view(&wgpu::TextureViewDescriptor::default())
}
