use super::resources::Vertex;

pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
const SCENE_WGSL: &str = include_str!("shaders/scene.wgsl");
const SKYBOX_WGSL: &str = include_str!("shaders/skybox.wgsl");

pub struct Layouts {
    /// Frame uniforms, shadow map, environment cube, background cube.
    pub frame: wgpu::BindGroupLayout,
    /// Per-draw uniforms and base color texture.
    pub draw: wgpu::BindGroupLayout,
    pub shadow: wgpu::BindGroupLayout,
    pub post: wgpu::BindGroupLayout,
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame layout"),
            entries: &frame_entries(),
        });
        let draw = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                texture_entry(
                    1,
                    wgpu::TextureViewDimension::D2,
                    wgpu::TextureSampleType::Float { filterable: true },
                ),
                sampler_entry(2, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let shadow = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });
        let post = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("post layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(
                    1,
                    wgpu::TextureViewDimension::D2,
                    wgpu::TextureSampleType::Float { filterable: true },
                ),
                sampler_entry(2, wgpu::SamplerBindingType::Filtering),
            ],
        });
        Self {
            frame,
            draw,
            shadow,
            post,
        }
    }
}

pub struct Pipelines {
    pub layouts: Layouts,
    pub shadow: wgpu::RenderPipeline,
    pub skybox: wgpu::RenderPipeline,
    pub opaque: wgpu::RenderPipeline,
    pub transparent: wgpu::RenderPipeline,
    pub post: wgpu::RenderPipeline,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let layouts = Layouts::new(device);

        let scene_module = shader(device, "scene shader", SCENE_WGSL);
        let shadow_module = shader(device, "shadow shader", include_str!("shaders/shadow.wgsl"));
        let skybox_module = shader(device, "skybox shader", SKYBOX_WGSL);
        let post_module = shader(device, "post shader", include_str!("shaders/post.wgsl"));

        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene pipeline layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.draw],
            push_constant_ranges: &[],
        });
        let shadow_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow pipeline layout"),
            bind_group_layouts: &[&layouts.shadow, &layouts.draw],
            push_constant_ranges: &[],
        });
        let skybox_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("skybox pipeline layout"),
            bind_group_layouts: &[&layouts.frame],
            push_constant_ranges: &[],
        });
        let post_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("post pipeline layout"),
            bind_group_layouts: &[&layouts.post],
            push_constant_ranges: &[],
        });

        let opaque = mesh_pipeline(device, "opaque pipeline", &scene_layout, &scene_module, None, true);
        let transparent = mesh_pipeline(
            device,
            "transparent pipeline",
            &scene_layout,
            &scene_module,
            Some(wgpu::BlendState::ALPHA_BLENDING),
            false,
        );

        let shadow = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow pipeline"),
            layout: Some(&shadow_layout),
            vertex: wgpu::VertexState {
                module: &shadow_module,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let skybox = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("skybox pipeline"),
            layout: Some(&skybox_layout),
            vertex: wgpu::VertexState {
                module: &skybox_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &skybox_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: HDR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let post = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("post pipeline"),
            layout: Some(&post_layout),
            vertex: wgpu::VertexState {
                module: &post_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &post_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            layouts,
            shadow,
            skybox,
            opaque,
            transparent,
            post,
        }
    }
}

fn shader(device: &wgpu::Device, label: &str, body: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(format!("{COMMON_WGSL}\n{body}").into()),
    })
}

fn mesh_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    blend: Option<wgpu::BlendState>,
    depth_write: bool,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: HDR_FORMAT,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        // back faces are lit with flipped normals in the shader
        primitive: wgpu::PrimitiveState {
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: depth_write,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Group 0 of the scene and skybox passes. Materials reflect binding 3, the
/// skybox draws binding 5.
fn frame_entries() -> [wgpu::BindGroupLayoutEntry; 6] {
    [
        uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
        texture_entry(
            1,
            wgpu::TextureViewDimension::D2,
            wgpu::TextureSampleType::Depth,
        ),
        sampler_entry(2, wgpu::SamplerBindingType::Comparison),
        texture_entry(
            3,
            wgpu::TextureViewDimension::Cube,
            wgpu::TextureSampleType::Float { filterable: true },
        ),
        sampler_entry(4, wgpu::SamplerBindingType::Filtering),
        texture_entry(
            5,
            wgpu::TextureViewDimension::Cube,
            wgpu::TextureSampleType::Float { filterable: true },
        ),
    ]
}

fn texture_entry(
    binding: u32,
    view_dimension: wgpu::TextureViewDimension,
    sample_type: wgpu::TextureSampleType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, kind: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(kind),
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::{frame_entries, SCENE_WGSL, SKYBOX_WGSL};

    fn group0_bindings(source: &str) -> Vec<u32> {
        source
            .lines()
            .filter_map(|line| line.trim().strip_prefix("@group(0) @binding("))
            .filter_map(|rest| rest.split(')').next()?.parse().ok())
            .collect()
    }

    fn is_cube(binding: u32) -> bool {
        frame_entries().iter().any(|entry| {
            entry.binding == binding
                && matches!(
                    entry.ty,
                    wgpu::BindingType::Texture {
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        ..
                    }
                )
        })
    }

    #[test]
    fn frame_layout_has_separate_environment_and_background_cubes() {
        assert!(is_cube(3));
        assert!(is_cube(5));
    }

    #[test]
    fn skybox_samples_background_and_scene_samples_environment() {
        let background = "@group(0) @binding(5) var background_map: texture_cube<f32>;";
        let environment = "@group(0) @binding(3) var env_map: texture_cube<f32>;";
        assert!(SKYBOX_WGSL.contains(background));
        assert!(!group0_bindings(SKYBOX_WGSL).contains(&3));
        assert!(SCENE_WGSL.contains(environment));
    }

    #[test]
    fn shader_bindings_exist_in_frame_layout() {
        let declared: Vec<u32> = frame_entries().iter().map(|entry| entry.binding).collect();
        for source in [SCENE_WGSL, SKYBOX_WGSL] {
            for binding in group0_bindings(source) {
                assert!(declared.contains(&binding), "binding {binding} missing");
            }
        }
    }
}
