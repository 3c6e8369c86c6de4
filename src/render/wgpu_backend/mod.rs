//! The concrete renderer: wgpu presenting into a winit window.
//!
//! Frames go through four passes: shadow depth, skybox, scene (opaque then
//! back-to-front transparent) into an HDR target, and a post pass that
//! applies exposure, tone mapping and output gamma into the surface.

mod pipelines;
mod resources;

use super::{
    CubeTextureHandle, PerspectiveCamera, RenderBackend, RenderError, ShadowMapType, SurfaceId,
    ToneMapping,
};
use crate::scene::Scene;
use glam::{Mat3, Mat4, Vec3};
use image::RgbaImage;
use pipelines::Pipelines;
use resources::{
    DrawUniforms, FrameUniforms, GpuCubeMap, GpuScene, RenderTargets, Samplers, ShadowUniforms,
};
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

pub struct WgpuBackend {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    // surface already applies the sRGB curve
    hardware_srgb: bool,
    pipelines: Pipelines,
    samplers: Samplers,
    frame_buffer: wgpu::Buffer,
    shadow_buffer: wgpu::Buffer,
    shadow_bind_group: wgpu::BindGroup,
    targets: RenderTargets,
    logical_size: (u32, u32),
    pixel_ratio: f32,
    shadow_map: Option<ShadowMapType>,
    tone_mapping: ToneMapping,
    output_gamma: f32,
    cube_maps: HashMap<CubeTextureHandle, GpuCubeMap>,
    next_cube_handle: u64,
    gpu_scene: Option<GpuScene>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>) -> Result<Self, RenderError> {
        pollster::block_on(Self::new_async(window))
    }

    async fn new_async(window: Arc<Window>) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| RenderError::SurfaceCreateFailed(err.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::AdapterUnavailable)?;
        let info = adapter.get_info();
        log::info!("Using GPU adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("orbitview device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|err| RenderError::DeviceCreateFailed(err.to_string()))?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| {
                RenderError::SurfaceCreateFailed("surface reports no formats".to_string())
            })?;
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!("Surface configured: {:?}, {}x{}", format, config.width, config.height);

        let pipelines = Pipelines::new(&device, format);
        let samplers = Samplers::new(&device);
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let shadow_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("shadow uniforms"),
            contents: bytemuck::bytes_of(&ShadowUniforms {
                light_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let shadow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow bind group"),
            layout: &pipelines.layouts.shadow,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: shadow_buffer.as_entire_binding(),
            }],
        });

        let logical = size.to_logical::<f64>(window.scale_factor());
        let logical_size = (
            (logical.width.round() as u32).max(1),
            (logical.height.round() as u32).max(1),
        );
        let targets = RenderTargets::new(
            &device,
            &pipelines.layouts,
            &frame_buffer,
            &samplers,
            render_size(logical_size, 1.0, device.limits().max_texture_dimension_2d),
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            hardware_srgb: format.is_srgb(),
            pipelines,
            samplers,
            frame_buffer,
            shadow_buffer,
            shadow_bind_group,
            targets,
            logical_size,
            pixel_ratio: 1.0,
            shadow_map: None,
            tone_mapping: ToneMapping::None,
            output_gamma: 2.2,
            cube_maps: HashMap::new(),
            next_cube_handle: 1,
            gpu_scene: None,
        })
    }

    fn configure_surface(&mut self) {
        let size = self.window.inner_size();
        self.config.width = size.width.max(1);
        self.config.height = size.height.max(1);
        self.surface.configure(&self.device, &self.config);
    }

    fn rebuild_targets(&mut self) {
        let size = render_size(
            self.logical_size,
            self.pixel_ratio,
            self.device.limits().max_texture_dimension_2d,
        );
        if size != self.targets.size {
            self.targets = RenderTargets::new(
                &self.device,
                &self.pipelines.layouts,
                &self.frame_buffer,
                &self.samplers,
                size,
            );
        }
    }

    fn ensure_scene(&mut self, scene: &Scene) -> Result<(), RenderError> {
        if self.gpu_scene.is_some() {
            return Ok(());
        }

        let environment = self.cube_map(scene.environment().handle())?;
        let background = self.cube_map(scene.background().handle())?;
        let gpu_scene = GpuScene::prepare(
            &self.device,
            &self.queue,
            &self.pipelines.layouts,
            &self.samplers,
            &self.frame_buffer,
            environment,
            background,
            scene,
        );
        self.gpu_scene = Some(gpu_scene);
        Ok(())
    }

    fn cube_map(&self, handle: CubeTextureHandle) -> Result<&GpuCubeMap, RenderError> {
        self.cube_maps
            .get(&handle)
            .ok_or(RenderError::UnknownCubeMap(handle))
    }

    fn frame_uniforms(
        &self,
        scene: &Scene,
        camera: &PerspectiveCamera,
        view_proj: Mat4,
        gpu: &GpuScene,
    ) -> (FrameUniforms, Option<Mat4>) {
        let projection = camera.projection_matrix().unwrap_or(Mat4::IDENTITY);
        let rotation_only = Mat4::from_mat3(Mat3::from_mat4(camera.view_matrix()));
        let sky_inverse = (projection * rotation_only).inverse();

        let light = scene.directional_light();
        let light_view_proj = light
            .and_then(|light| light.shadow_view_projection())
            .filter(|_| self.shadow_map.is_some());
        let (direction, light_color) = light
            .map(|light| (light.direction(), Vec3::from(light.color) * light.intensity))
            .unwrap_or((Vec3::NEG_Y, Vec3::ZERO));
        let ambient = scene
            .ambient_light()
            .map(|ambient| Vec3::from(ambient.color) * ambient.intensity)
            .unwrap_or(Vec3::ZERO);

        let (exposure, mode) = match self.tone_mapping {
            ToneMapping::None => (1.0, 0.0),
            ToneMapping::Linear { exposure } => (exposure, 1.0),
            ToneMapping::AcesFilmic { exposure } => (exposure, 2.0),
        };
        let inverse_gamma = if self.hardware_srgb || self.output_gamma <= 0.0 {
            1.0
        } else {
            1.0 / self.output_gamma
        };
        let pcf_radius = match self.shadow_map {
            None | Some(ShadowMapType::Basic) => 0.0,
            Some(ShadowMapType::Pcf) => 1.0,
            Some(ShadowMapType::PcfSoft) => 2.0,
        };

        let uniforms = FrameUniforms {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: sky_inverse.to_cols_array_2d(),
            light_view_proj: light_view_proj
                .unwrap_or(Mat4::IDENTITY)
                .to_cols_array_2d(),
            camera_position: camera.position().extend(1.0).to_array(),
            light_direction: direction
                .extend(if light_view_proj.is_some() { 1.0 } else { 0.0 })
                .to_array(),
            light_color: light_color.extend(gpu.shadow_texel).to_array(),
            ambient_color: ambient
                .extend(gpu.environment_mips.saturating_sub(1) as f32)
                .to_array(),
            tone: [exposure, mode, inverse_gamma, pcf_radius],
        };
        (uniforms, light_view_proj)
    }
}

impl RenderBackend for WgpuBackend {
    fn surface_id(&self) -> SurfaceId {
        SurfaceId(u64::from(self.window.id()))
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.logical_size = (width.max(1), height.max(1));
        self.configure_surface();
        self.rebuild_targets();
    }

    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio.max(0.1);
        self.rebuild_targets();
    }

    fn enable_shadow_map(&mut self, kind: ShadowMapType) {
        self.shadow_map = Some(kind);
    }

    fn set_tone_mapping(&mut self, tone_mapping: ToneMapping) {
        self.tone_mapping = tone_mapping;
    }

    fn set_output_gamma(&mut self, gamma: f32) {
        self.output_gamma = gamma;
    }

    fn upload_cube_map(
        &mut self,
        face_size: u32,
        faces: &[RgbaImage; 6],
    ) -> Result<CubeTextureHandle, RenderError> {
        let cube = GpuCubeMap::upload(&self.device, &self.queue, face_size, faces)?;
        let handle = CubeTextureHandle(self.next_cube_handle);
        self.next_cube_handle += 1;
        log::debug!(
            "Uploaded cube map {:?}: {} px faces, {} mips",
            handle,
            face_size,
            cube.mip_count
        );
        self.cube_maps.insert(handle, cube);
        Ok(handle)
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), RenderError> {
        let view_proj = camera
            .view_projection()
            .ok_or(RenderError::CameraNotReady)?;
        self.ensure_scene(scene)?;

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated; reconfiguring and skipping frame");
                self.configure_surface();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface acquire timed out; skipping frame");
                return Ok(());
            }
            Err(err) => return Err(RenderError::Surface(err.to_string())),
        };

        let Some(gpu) = self.gpu_scene.as_ref() else {
            return Ok(());
        };
        let (uniforms, light_view_proj) = self.frame_uniforms(scene, camera, view_proj, gpu);
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&uniforms));
        if let Some(light_view_proj) = light_view_proj {
            self.queue.write_buffer(
                &self.shadow_buffer,
                0,
                bytemuck::bytes_of(&ShadowUniforms {
                    light_view_proj: light_view_proj.to_cols_array_2d(),
                }),
            );
        }

        // Per-draw transforms in walk order, plus view depth for sorting.
        let view = camera.view_matrix();
        let mut depths = Vec::with_capacity(gpu.draws.len());
        let mut index = 0;
        scene.walk_meshes(|world, node| {
            let Some(draw) = gpu.draws.get(index) else {
                return;
            };
            index += 1;
            if let Some(material) = scene.materials().get(node.material) {
                self.queue.write_buffer(
                    &draw.uniforms,
                    0,
                    bytemuck::bytes_of(&DrawUniforms::new(world, material, node.receive_shadow)),
                );
            }
            depths.push((view * world).transform_point3(draw.local_center).z);
        });

        let mut transparent: Vec<usize> = (0..gpu.draws.len())
            .filter(|&i| gpu.draws[i].transparent)
            .collect();
        // most negative view z is farthest
        transparent.sort_by(|&a, &b| depths[a].total_cmp(&depths[b]));

        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        if light_view_proj.is_some() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &gpu.shadow_map,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.shadow);
            pass.set_bind_group(0, &self.shadow_bind_group, &[]);
            for draw in gpu.draws.iter().filter(|draw| draw.cast_shadow) {
                let Some(mesh) = gpu.meshes.get(draw.mesh.0) else {
                    continue;
                };
                pass.set_bind_group(1, &draw.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.hdr,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &gpu.frame_bind_group, &[]);
            pass.set_pipeline(&self.pipelines.skybox);
            pass.draw(0..3, 0..1);

            let opaque = (0..gpu.draws.len()).filter(|&i| !gpu.draws[i].transparent);
            for (pipeline, order) in [
                (&self.pipelines.opaque, opaque.collect::<Vec<_>>()),
                (&self.pipelines.transparent, transparent),
            ] {
                pass.set_pipeline(pipeline);
                for i in order {
                    let draw = &gpu.draws[i];
                    let Some(mesh) = gpu.meshes.get(draw.mesh.0) else {
                        continue;
                    };
                    pass.set_bind_group(1, &draw.bind_group, &[]);
                    pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                    pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("post pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.post);
            pass.set_bind_group(0, &self.targets.post_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
        Ok(())
    }
}

/// Render resolution: logical size times pixel ratio, clamped to device limits.
fn render_size(logical: (u32, u32), pixel_ratio: f32, limit: u32) -> (u32, u32) {
    let scale = |v: u32| ((v as f32 * pixel_ratio).round() as u32).clamp(1, limit.max(1));
    (scale(logical.0), scale(logical.1))
}
