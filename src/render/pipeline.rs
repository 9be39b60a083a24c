use std::collections::HashMap;
use std::mem;
use std::num::NonZeroU64;

use glam::UVec2;
use wgpu::util::DeviceExt;

use crate::asset::{Assets, Handle};
use crate::render::buffers::{FrameBuffer, LightsBuffer, ObjectsBuffer};
use crate::render::context::GpuContext;
use crate::render::environment::EnvironmentResources;
use crate::render::material::MaterialShader;
use crate::render::postprocess::PostProcess;
use crate::render::primitive::{PrimitiveId, PrimitiveKind};
use crate::render::scene::RenderScene;
use crate::render::ssao::SsaoResources;
use crate::render::target::{GBuffer, RenderTarget, DEPTH_FORMAT, HDR_FORMAT};
use crate::render::uniforms::{
    FrameUniform, InstancedUniform, LightingUniform, ShadowViewUniform, SkyUniform,
};
use crate::render::vertex::{InstanceRaw, Vertex};
use crate::render::ShaderDomain;
use crate::settings::RenderSettings;

const INITIAL_OBJECTS_CAPACITY: u32 = 4096;
/// Dynamic-offset stride for small per-draw uniforms.
const UNIFORM_SLOT: u64 = 256;
const MAX_SHADOW_SLOTS: u64 = 8;
const MAX_INSTANCED_SLOTS: u64 = 64;

#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub shadow_draw_calls: u32,
    pub gbuffer_draw_calls: u32,
    pub forward_draw_calls: u32,
    pub debug_draw_calls: u32,
}

struct FrameState {
    encoder: wgpu::CommandEncoder,
    rendered: bool,
}

struct FoliageDraw {
    buffer: wgpu::Buffer,
    count: u32,
    slot: u32,
}

/// Owns every pass target and pipeline, and drives the frame's pass
/// sequence against one built [`RenderScene`]. Strictly
/// `begin -> render -> end`, once per displayed frame; anything else is a
/// programmer error and asserts.
pub struct RenderPipeline {
    allocated: UVec2,
    frame_buffer: FrameBuffer,
    objects: ObjectsBuffer,
    lights: LightsBuffer,
    gbuffer: GBuffer,
    hdr: RenderTarget,
    ssao: SsaoResources,
    environment: EnvironmentResources,
    post: PostProcess,

    gbuffer_pipeline: wgpu::RenderPipeline,
    gbuffer_instanced_pipeline: wgpu::RenderPipeline,
    gbuffer_pipeline_layout: wgpu::PipelineLayout,
    custom_gbuffer_pipelines: HashMap<Handle<MaterialShader>, wgpu::RenderPipeline>,

    shadow_pipeline: wgpu::RenderPipeline,
    shadow_instanced_pipeline: wgpu::RenderPipeline,
    shadow_pipeline_layout: wgpu::PipelineLayout,
    shadow_instanced_pipeline_layout: wgpu::PipelineLayout,
    custom_shadow_pipelines: HashMap<(Handle<MaterialShader>, bool), wgpu::RenderPipeline>,
    shadow_view_buffer: wgpu::Buffer,
    shadow_view_bind_group: wgpu::BindGroup,

    lighting_pipeline: wgpu::RenderPipeline,
    lighting_uniform_buffer: wgpu::Buffer,
    lighting_uniform_bind_group: wgpu::BindGroup,
    lighting_inputs_layout: wgpu::BindGroupLayout,
    lighting_inputs: Option<wgpu::BindGroup>,
    shadow_inputs_layout: wgpu::BindGroupLayout,
    shadow_inputs: Option<wgpu::BindGroup>,

    sky_pipeline: wgpu::RenderPipeline,
    sky_uniform_buffer: wgpu::Buffer,
    sky_uniform_bind_group: wgpu::BindGroup,
    grid_pipeline: wgpu::RenderPipeline,
    grid_enabled: bool,
    forward_pipeline: wgpu::RenderPipeline,
    debug_pipeline: wgpu::RenderPipeline,
    debug_cube: crate::asset::Mesh,

    instanced_uniform_buffer: wgpu::Buffer,
    instanced_bind_group: wgpu::BindGroup,
    foliage_draws: HashMap<PrimitiveId, FoliageDraw>,

    frame: Option<FrameState>,
    stats: PipelineStats,
}

impl RenderPipeline {
    pub fn new(
        context: &GpuContext,
        settings: &RenderSettings,
        output_format: wgpu::TextureFormat,
    ) -> Self {
        let device = &context.device;
        let size = UVec2::new(settings.resolution.width, settings.resolution.height);

        let frame_buffer = FrameBuffer::new(device);
        let objects = ObjectsBuffer::new(device, INITIAL_OBJECTS_CAPACITY);
        let lights = LightsBuffer::new(device);
        let gbuffer = GBuffer::new(device, size);
        let hdr = RenderTarget::new(device, "HdrColor", size, HDR_FORMAT);
        let ssao = SsaoResources::new(device, &context.queue, size, settings.ssao);
        let environment = EnvironmentResources::new(
            device,
            &context.queue,
            settings.environment_path.as_deref().map(std::path::Path::new),
        );
        let post = PostProcess::new(device, size, output_format, settings.fxaa);

        // Geometry pipelines.
        let gbuffer_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("GBufferShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/gbuffer.wgsl").into()),
        });
        let gbuffer_instanced_shader =
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("GBufferInstancedShader"),
                source: wgpu::ShaderSource::Wgsl(
                    include_str!("../shader/gbuffer_instanced.wgsl").into(),
                ),
            });

        let instanced_bind_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("InstancedBindLayout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: Some(
                            NonZeroU64::new(mem::size_of::<InstancedUniform>() as u64).unwrap(),
                        ),
                    },
                    count: None,
                }],
            });

        let instanced_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("InstancedUniformBuffer"),
            size: UNIFORM_SLOT * MAX_INSTANCED_SLOTS,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let instanced_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("InstancedBindGroup"),
            layout: &instanced_bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &instanced_uniform_buffer,
                    offset: 0,
                    size: Some(
                        NonZeroU64::new(mem::size_of::<InstancedUniform>() as u64).unwrap(),
                    ),
                }),
            }],
        });

        let gbuffer_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("GBufferPipelineLayout"),
            bind_group_layouts: &[&frame_buffer.bind_layout, &objects.bind_layout],
            push_constant_ranges: &[],
        });
        let gbuffer_pipeline =
            create_gbuffer_pipeline(device, &gbuffer_layout, &gbuffer_shader, false);

        let gbuffer_instanced_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("GBufferInstancedPipelineLayout"),
                bind_group_layouts: &[
                    &frame_buffer.bind_layout,
                    &objects.bind_layout,
                    &instanced_bind_layout,
                ],
                push_constant_ranges: &[],
            });
        let gbuffer_instanced_pipeline = create_gbuffer_pipeline(
            device,
            &gbuffer_instanced_layout,
            &gbuffer_instanced_shader,
            true,
        );

        // Shadow pipelines and the per-cascade view uniform (dynamic offset
        // slot per cascade).
        let shadow_view_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("ShadowViewLayout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: Some(
                            NonZeroU64::new(mem::size_of::<ShadowViewUniform>() as u64).unwrap(),
                        ),
                    },
                    count: None,
                }],
            });
        let shadow_view_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ShadowViewBuffer"),
            size: UNIFORM_SLOT * MAX_SHADOW_SLOTS,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let shadow_view_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ShadowViewBindGroup"),
            layout: &shadow_view_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &shadow_view_buffer,
                    offset: 0,
                    size: Some(
                        NonZeroU64::new(mem::size_of::<ShadowViewUniform>() as u64).unwrap(),
                    ),
                }),
            }],
        });

        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ShadowShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/shadow.wgsl").into()),
        });
        let shadow_instanced_shader =
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("ShadowInstancedShader"),
                source: wgpu::ShaderSource::Wgsl(
                    include_str!("../shader/shadow_instanced.wgsl").into(),
                ),
            });

        let shadow_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ShadowPipelineLayout"),
            bind_group_layouts: &[&shadow_view_layout, &objects.bind_layout],
            push_constant_ranges: &[],
        });
        let shadow_pipeline =
            create_shadow_pipeline(device, &shadow_layout, &shadow_shader, false);

        let shadow_instanced_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("ShadowInstancedPipelineLayout"),
                bind_group_layouts: &[&shadow_view_layout],
                push_constant_ranges: &[],
            });
        let shadow_instanced_pipeline =
            create_shadow_pipeline(device, &shadow_instanced_layout, &shadow_instanced_shader, true);

        // Deferred lighting.
        let lighting_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("LightingShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/lighting.wgsl").into()),
        });

        let lighting_uniform_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("LightingUniformLayout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: Some(
                                NonZeroU64::new(mem::size_of::<LightingUniform>() as u64)
                                    .unwrap(),
                            ),
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });
        let lighting_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("LightingUniformBuffer"),
            size: mem::size_of::<LightingUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let lighting_uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LightingUniformBindGroup"),
            layout: &lighting_uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: lighting_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights.buffer.as_entire_binding(),
                },
            ],
        });

        let lighting_inputs_layout = create_lighting_inputs_layout(device);
        let shadow_inputs_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("LightingShadowLayout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2Array,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                        count: None,
                    },
                ],
            });

        let lighting_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("LightingPipelineLayout"),
                bind_group_layouts: &[
                    &lighting_uniform_layout,
                    &lighting_inputs_layout,
                    &shadow_inputs_layout,
                    environment.bind_layout(),
                ],
                push_constant_ranges: &[],
            });
        let lighting_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("LightingPipeline"),
            layout: Some(&lighting_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &lighting_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &lighting_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(HDR_FORMAT.into())],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Forward-stage pipelines.
        let sky_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("SkyShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/sky.wgsl").into()),
        });
        let sky_uniform_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("SkyUniformLayout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            NonZeroU64::new(mem::size_of::<SkyUniform>() as u64).unwrap(),
                        ),
                    },
                    count: None,
                }],
            });
        let sky_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SkyUniformBuffer"),
            size: mem::size_of::<SkyUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sky_uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SkyUniformBindGroup"),
            layout: &sky_uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: sky_uniform_buffer.as_entire_binding(),
            }],
        });
        let sky_pipeline = create_forward_stage_pipeline(
            device,
            "SkyPipeline",
            &sky_shader,
            &[&sky_uniform_layout],
            &[],
            false,
        );

        let grid_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("GridShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/grid.wgsl").into()),
        });
        let grid_pipeline = create_forward_stage_pipeline(
            device,
            "GridPipeline",
            &grid_shader,
            &[&frame_buffer.bind_layout],
            &[],
            true,
        );

        let forward_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ForwardShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/forward.wgsl").into()),
        });
        let forward_pipeline = create_forward_stage_pipeline(
            device,
            "ForwardPipeline",
            &forward_shader,
            &[
                &frame_buffer.bind_layout,
                &objects.bind_layout,
                &lights.bind_layout,
            ],
            &[Vertex::layout()],
            true,
        );

        let debug_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("DebugShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/debug.wgsl").into()),
        });
        let debug_pipeline = create_forward_stage_pipeline(
            device,
            "DebugPipeline",
            &debug_shader,
            &[&frame_buffer.bind_layout, &objects.bind_layout],
            &[Vertex::layout()],
            true,
        );

        let mut debug_cube = crate::asset::cube_mesh();
        debug_cube.upload(device);

        Self {
            allocated: size,
            frame_buffer,
            objects,
            lights,
            gbuffer,
            hdr,
            ssao,
            environment,
            post,
            gbuffer_pipeline,
            gbuffer_instanced_pipeline,
            gbuffer_pipeline_layout: gbuffer_layout,
            custom_gbuffer_pipelines: HashMap::new(),
            shadow_pipeline,
            shadow_instanced_pipeline,
            shadow_pipeline_layout: shadow_layout,
            shadow_instanced_pipeline_layout: shadow_instanced_layout,
            custom_shadow_pipelines: HashMap::new(),
            shadow_view_buffer,
            shadow_view_bind_group,
            lighting_pipeline,
            lighting_uniform_buffer,
            lighting_uniform_bind_group,
            lighting_inputs_layout,
            lighting_inputs: None,
            shadow_inputs_layout,
            shadow_inputs: None,
            sky_pipeline,
            sky_uniform_buffer,
            sky_uniform_bind_group,
            grid_pipeline,
            grid_enabled: true,
            forward_pipeline,
            debug_pipeline,
            debug_cube,
            instanced_uniform_buffer,
            instanced_bind_group,
            foliage_draws: HashMap::new(),
            frame: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn set_grid_enabled(&mut self, enabled: bool) {
        self.grid_enabled = enabled;
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub(crate) fn environment_mut(&mut self) -> &mut EnvironmentResources {
        &mut self.environment
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.post.set_exposure(exposure);
    }

    /// Opens the frame. Reallocates the internal targets only when the
    /// requested extent exceeds what is already allocated; shrinking keeps
    /// the larger targets around.
    pub fn begin(
        &mut self,
        context: &GpuContext,
        extent: UVec2,
        scene: &mut RenderScene,
        assets: &Assets,
        time: f32,
    ) {
        assert!(self.frame.is_none(), "begin() called inside an open frame");

        if extent.x > self.allocated.x || extent.y > self.allocated.y {
            self.resize(context, extent.max(self.allocated));
        }

        scene.cascades_mut().create_targets(&context.device);

        let device = &context.device;
        let queue = &context.queue;

        self.frame_buffer
            .update(queue, &FrameUniform::from_view(scene.view(), time));
        self.objects
            .update(device, queue, scene.primitives(), assets);
        self.lights
            .update(queue, scene.lights(), scene.environment(), 0.03);

        self.ssao.update(queue, scene.view(), self.allocated);
        self.post.update(queue, self.allocated);

        let lighting = LightingUniform::build(
            scene.view(),
            scene.environment(),
            scene.cascades(),
            0.03,
            1.0,
            1.0,
        );
        queue.write_buffer(&self.lighting_uniform_buffer, 0, bytemuck::bytes_of(&lighting));
        let sky = SkyUniform::build(scene.view(), scene.environment());
        queue.write_buffer(&self.sky_uniform_buffer, 0, bytemuck::bytes_of(&sky));

        // Per-cascade shadow view slots.
        for (index, cascade) in scene.cascades().cascades().iter().enumerate() {
            let uniform = ShadowViewUniform {
                view_proj: cascade.view_proj.to_cols_array_2d(),
            };
            queue.write_buffer(
                &self.shadow_view_buffer,
                index as u64 * UNIFORM_SLOT,
                bytemuck::bytes_of(&uniform),
            );
        }

        self.prepare_foliage(device, queue, scene, assets);
        self.prepare_custom_pipelines(device, scene, assets);

        if self.lighting_inputs.is_none() {
            self.bind_frame_inputs(device);
        }
        if self.shadow_inputs.is_none() {
            if let Some(targets) = scene.cascades().targets() {
                self.shadow_inputs =
                    Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("LightingShadowBindGroup"),
                        layout: &self.shadow_inputs_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(
                                    targets.array_view(),
                                ),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::Sampler(targets.sampler()),
                            },
                        ],
                    }));
            }
        }

        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("FrameEncoder"),
        });
        self.frame = Some(FrameState {
            encoder,
            rendered: false,
        });
        self.stats = PipelineStats::default();
    }

    /// Encodes the full pass sequence. Must be bracketed by `begin`/`end`.
    pub fn render(
        &mut self,
        context: &GpuContext,
        scene: &mut RenderScene,
        assets: &Assets,
        output: &wgpu::TextureView,
    ) {
        let mut frame = self
            .frame
            .take()
            .expect("render() called without begin()");
        assert!(!frame.rendered, "render() called twice in one frame");

        // Dynamic sky refilter, only when dirty.
        if scene.environment().sky_enabled {
            let environment = *scene.environment();
            self.environment
                .update_sky(&context.device, &context.queue, &environment);
        }

        self.install_default_shadow_shaders(scene, assets);

        let encoder = &mut frame.encoder;

        if scene.environment().sun_enabled {
            self.render_shadow_passes(encoder, scene, assets);
        }
        self.render_gbuffer_pass(encoder, scene, assets);

        if self.ssao.enabled() {
            self.ssao.render(encoder);
        } else {
            self.ssao.render_disabled(encoder);
        }

        self.render_lighting_pass(encoder, scene);
        self.render_forward_pass(encoder, scene, assets);
        self.post.execute(encoder, output);

        frame.rendered = true;
        self.frame = Some(frame);
    }

    /// Closes the frame and submits the command stream.
    pub fn end(&mut self, context: &GpuContext) {
        let frame = self.frame.take().expect("end() called without begin()");
        assert!(frame.rendered, "end() called before render()");
        context.queue.submit(Some(frame.encoder.finish()));
    }

    fn resize(&mut self, context: &GpuContext, size: UVec2) {
        log::info!(
            "Growing render targets: {}x{} -> {}x{}",
            self.allocated.x,
            self.allocated.y,
            size.x,
            size.y
        );
        let device = &context.device;
        self.allocated = size;
        self.gbuffer = GBuffer::new(device, size);
        self.hdr = RenderTarget::new(device, "HdrColor", size, HDR_FORMAT);
        self.ssao.resize(device, size);
        self.post.resize(device, size);
        self.lighting_inputs = None;
    }

    /// G-buffer/AO/HDR views changed; rebuild the screen-pass bind groups.
    fn bind_frame_inputs(&mut self, device: &wgpu::Device) {
        self.ssao
            .bind_inputs(device, self.gbuffer.depth.view(), self.gbuffer.normal.view());
        self.post.bind_inputs(device, self.hdr.view());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("GBufferSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        self.lighting_inputs = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LightingInputsBindGroup"),
            layout: &self.lighting_inputs_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(self.gbuffer.albedo.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(self.gbuffer.normal.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(self.gbuffer.brdf.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(self.gbuffer.emissive.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(self.gbuffer.depth.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(self.ssao.output_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        }));
    }

    /// Builds the per-frame instance buffers for foliage primitives and
    /// assigns each a dynamic uniform slot carrying its material index.
    fn prepare_foliage(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &RenderScene,
        _assets: &Assets,
    ) {
        self.foliage_draws.clear();
        let mut slot = 0u32;
        for (id, primitive) in scene.primitives().iter() {
            let PrimitiveKind::FoliageInstances { transforms, .. } = &primitive.kind else {
                continue;
            };
            if slot as u64 >= MAX_INSTANCED_SLOTS {
                log::warn!("Too many foliage layers this frame; dropping the rest");
                break;
            }

            let instances: Vec<InstanceRaw> = transforms
                .iter()
                .map(|m| InstanceRaw {
                    model: m.to_cols_array_2d(),
                })
                .collect();
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("FoliageInstanceBuffer"),
                contents: bytemuck::cast_slice(&instances),
                usage: wgpu::BufferUsages::VERTEX,
            });

            let uniform = InstancedUniform {
                material_index: [primitive.material.index(), 0, 0, 0],
            };
            queue.write_buffer(
                &self.instanced_uniform_buffer,
                slot as u64 * UNIFORM_SLOT,
                bytemuck::bytes_of(&uniform),
            );

            self.foliage_draws.insert(
                id,
                FoliageDraw {
                    buffer,
                    count: instances.len() as u32,
                    slot,
                },
            );
            slot += 1;
        }
    }

    /// Builds pipelines for materials whose shader carries its own GPU
    /// module. Done before any pass opens; a shader that is not on the GPU
    /// falls back to the built-in pipelines at draw time.
    fn prepare_custom_pipelines(
        &mut self,
        device: &wgpu::Device,
        scene: &RenderScene,
        assets: &Assets,
    ) {
        for shader_batch in scene.deferred().shader_batches() {
            let handle = shader_batch.shader;
            if self.custom_gbuffer_pipelines.contains_key(&handle) {
                continue;
            }
            let Some(module) = assets.shaders.get(handle).and_then(|s| s.module()) else {
                continue;
            };
            self.custom_gbuffer_pipelines.insert(
                handle,
                create_gbuffer_pipeline(device, &self.gbuffer_pipeline_layout, module, false),
            );
        }

        for cascade in scene.cascades().cascades() {
            for bucket in cascade.batch.buckets() {
                let Some(handle) = bucket.shader else {
                    continue;
                };
                for &id in &bucket.primitives {
                    let instanced = matches!(
                        scene.primitives().get(id).kind,
                        PrimitiveKind::FoliageInstances { .. }
                    );
                    if self.custom_shadow_pipelines.contains_key(&(handle, instanced)) {
                        continue;
                    }
                    let Some(module) = assets.shaders.get(handle).and_then(|s| s.module())
                    else {
                        continue;
                    };
                    let layout = if instanced {
                        &self.shadow_instanced_pipeline_layout
                    } else {
                        &self.shadow_pipeline_layout
                    };
                    self.custom_shadow_pipelines.insert(
                        (handle, instanced),
                        create_shadow_pipeline(device, layout, module, instanced),
                    );
                }
            }
        }
    }

    /// Fills in the built-in depth shaders on any default bucket drawn for
    /// the first time. Deferred until now because the default materials are
    /// created by the asset registry, not the pipeline.
    fn install_default_shadow_shaders(&self, scene: &mut RenderScene, assets: &Assets) {
        for cascade in scene.cascades_mut().cascades_mut() {
            for domain in [
                ShaderDomain::Mesh,
                ShaderDomain::Skinned,
                ShaderDomain::Terrain,
            ] {
                let needs_install = cascade
                    .batch
                    .default_bucket(domain)
                    .map(|bucket| bucket.shader.is_none() && !bucket.primitives.is_empty())
                    .unwrap_or(false);
                if needs_install {
                    cascade.batch.set_default_shader(
                        domain,
                        assets.default_shader(domain),
                        assets.default_material(domain),
                    );
                }
            }
        }
    }

    /// One depth-only pass per cascade. Must run before the lighting pass,
    /// which samples every cascade map.
    fn render_shadow_passes(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &RenderScene,
        assets: &Assets,
    ) {
        let Some(targets) = scene.cascades().targets() else {
            log::warn!("Shadow targets missing; skipping shadow passes");
            return;
        };

        let mut draw_calls = 0u32;
        for (index, cascade) in scene.cascades().cascades().iter().enumerate() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ShadowPass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: targets.layer_view(index),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let slot_offset = index as u32 * UNIFORM_SLOT as u32;

            for bucket in cascade.batch.buckets() {
                if bucket.primitives.is_empty() {
                    continue;
                }

                for &id in &bucket.primitives {
                    let primitive = scene.primitives().get(id);
                    match &primitive.kind {
                        PrimitiveKind::FoliageInstances { mesh, .. } => {
                            let Some(draw) = self.foliage_draws.get(&id) else {
                                continue;
                            };
                            let Some(gpu) =
                                assets.meshes.get(*mesh).and_then(|m| m.gpu())
                            else {
                                continue;
                            };
                            let pipeline = bucket
                                .shader
                                .and_then(|h| self.custom_shadow_pipelines.get(&(h, true)))
                                .unwrap_or(&self.shadow_instanced_pipeline);
                            pass.set_pipeline(pipeline);
                            pass.set_bind_group(0, &self.shadow_view_bind_group, &[slot_offset]);
                            pass.set_vertex_buffer(0, gpu.vertex_buffer().slice(..));
                            pass.set_vertex_buffer(1, draw.buffer.slice(..));
                            pass.set_index_buffer(gpu.index_buffer().slice(..), gpu.index_format());
                            pass.draw_indexed(0..gpu.index_count(), 0, 0..draw.count);
                            draw_calls += 1;
                        }
                        kind => {
                            let Some(mesh) = kind.mesh() else {
                                continue;
                            };
                            let Some(gpu) =
                                assets.meshes.get(mesh).and_then(|m| m.gpu())
                            else {
                                log::warn!("Shadow caster mesh not on GPU; skipping");
                                continue;
                            };
                            let pipeline = bucket
                                .shader
                                .and_then(|h| self.custom_shadow_pipelines.get(&(h, false)))
                                .unwrap_or(&self.shadow_pipeline);
                            pass.set_pipeline(pipeline);
                            pass.set_bind_group(0, &self.shadow_view_bind_group, &[slot_offset]);
                            pass.set_bind_group(1, &self.objects.bind_group, &[]);
                            pass.set_vertex_buffer(0, gpu.vertex_buffer().slice(..));
                            pass.set_index_buffer(gpu.index_buffer().slice(..), gpu.index_format());
                            let object = id.index() as u32;
                            pass.draw_indexed(0..gpu.index_count(), 0, object..object + 1);
                            draw_calls += 1;
                        }
                    }
                }
            }
        }
        self.stats.shadow_draw_calls += draw_calls;
    }

    /// Geometry into the G-buffer attachments; the one and only depth clear
    /// of the frame happens here, the forward pass later depth-tests against
    /// this same buffer.
    fn render_gbuffer_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &RenderScene,
        assets: &Assets,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("GBufferPass"),
            color_attachments: &[
                clear_attachment(&self.gbuffer.albedo),
                clear_attachment(&self.gbuffer.normal),
                clear_attachment(&self.gbuffer.brdf),
                clear_attachment(&self.gbuffer.emissive),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.gbuffer.depth.view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        // Shader batches in first-seen order; one pipeline bind per shader,
        // then one draw per primitive. Material state lives in the storage
        // buffer, indexed per object.
        let mut draw_calls = 0u32;
        for shader_batch in scene.deferred().shader_batches() {
            let shader_pipeline = self
                .custom_gbuffer_pipelines
                .get(&shader_batch.shader)
                .unwrap_or(&self.gbuffer_pipeline);
            for &material_index in &shader_batch.materials {
                let material_batch = scene.deferred().material_batch(material_index);
                for &id in &material_batch.primitives {
                    let primitive = scene.primitives().get(id);
                    match &primitive.kind {
                        PrimitiveKind::FoliageInstances { mesh, .. } => {
                            let Some(draw) = self.foliage_draws.get(&id) else {
                                continue;
                            };
                            let Some(gpu) =
                                assets.meshes.get(*mesh).and_then(|m| m.gpu())
                            else {
                                continue;
                            };
                            pass.set_pipeline(&self.gbuffer_instanced_pipeline);
                            pass.set_bind_group(0, &self.frame_buffer.bind_group, &[]);
                            pass.set_bind_group(1, &self.objects.bind_group, &[]);
                            pass.set_bind_group(
                                2,
                                &self.instanced_bind_group,
                                &[draw.slot * UNIFORM_SLOT as u32],
                            );
                            pass.set_vertex_buffer(0, gpu.vertex_buffer().slice(..));
                            pass.set_vertex_buffer(1, draw.buffer.slice(..));
                            pass.set_index_buffer(gpu.index_buffer().slice(..), gpu.index_format());
                            pass.draw_indexed(0..gpu.index_count(), 0, 0..draw.count);
                            draw_calls += 1;
                        }
                        kind => {
                            let Some(mesh) = kind.mesh() else {
                                continue;
                            };
                            let Some(gpu) =
                                assets.meshes.get(mesh).and_then(|m| m.gpu())
                            else {
                                log::warn!("Mesh not on GPU; skipping draw");
                                continue;
                            };
                            pass.set_pipeline(shader_pipeline);
                            pass.set_bind_group(0, &self.frame_buffer.bind_group, &[]);
                            pass.set_bind_group(1, &self.objects.bind_group, &[]);
                            pass.set_vertex_buffer(0, gpu.vertex_buffer().slice(..));
                            pass.set_index_buffer(gpu.index_buffer().slice(..), gpu.index_format());
                            let object = id.index() as u32;
                            pass.draw_indexed(0..gpu.index_count(), 0, object..object + 1);
                            draw_calls += 1;
                        }
                    }
                }
            }
        }
        drop(pass);
        self.stats.gbuffer_draw_calls += draw_calls;
    }

    /// Fullscreen resolve of the G-buffer against the bounded light array,
    /// the cascade maps, and the active environment.
    fn render_lighting_pass(&mut self, encoder: &mut wgpu::CommandEncoder, scene: &RenderScene) {
        let (Some(inputs), Some(shadow_inputs)) =
            (self.lighting_inputs.as_ref(), self.shadow_inputs.as_ref())
        else {
            log::warn!("Lighting inputs not bound; skipping the lighting pass");
            return;
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("LightingPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.hdr.view(),
                depth_slice: None,
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

        pass.set_pipeline(&self.lighting_pipeline);
        pass.set_bind_group(0, &self.lighting_uniform_bind_group, &[]);
        pass.set_bind_group(1, inputs, &[]);
        pass.set_bind_group(2, shadow_inputs, &[]);
        pass.set_bind_group(
            3,
            self.environment.bind_group(scene.environment().sky_enabled),
            &[],
        );
        pass.draw(0..3, 0..1);
    }

    /// Sky, grid, translucent geometry (far to near), debug shapes. Shares
    /// the G-buffer depth by reference: depth test on, depth writes off.
    fn render_forward_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &RenderScene,
        assets: &Assets,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ForwardPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.hdr.view(),
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.gbuffer.depth.view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let mut forward_draws = 0u32;
        let mut debug_draws = 0u32;

        if scene.environment().sky_enabled {
            pass.set_pipeline(&self.sky_pipeline);
            pass.set_bind_group(0, &self.sky_uniform_bind_group, &[]);
            pass.draw(0..3, 0..1);
            forward_draws += 1;
        }

        if self.grid_enabled {
            pass.set_pipeline(&self.grid_pipeline);
            pass.set_bind_group(0, &self.frame_buffer.bind_group, &[]);
            pass.draw(0..6, 0..1);
            forward_draws += 1;
        }

        if !scene.translucent().is_empty() {
            pass.set_pipeline(&self.forward_pipeline);
            pass.set_bind_group(0, &self.frame_buffer.bind_group, &[]);
            pass.set_bind_group(1, &self.objects.bind_group, &[]);
            pass.set_bind_group(2, &self.lights.bind_group, &[]);

            for entry in scene.translucent().entries() {
                let primitive = scene.primitives().get(entry.primitive);
                let Some(mesh) = primitive.kind.mesh() else {
                    continue;
                };
                let Some(gpu) = assets.meshes.get(mesh).and_then(|m| m.gpu()) else {
                    continue;
                };
                pass.set_vertex_buffer(0, gpu.vertex_buffer().slice(..));
                pass.set_index_buffer(gpu.index_buffer().slice(..), gpu.index_format());
                let object = entry.primitive.index() as u32;
                pass.draw_indexed(0..gpu.index_count(), 0, object..object + 1);
                forward_draws += 1;
            }
        }

        if !scene.debug_primitives().is_empty() {
            if let Some(gpu) = self.debug_cube.gpu() {
                pass.set_pipeline(&self.debug_pipeline);
                pass.set_bind_group(0, &self.frame_buffer.bind_group, &[]);
                pass.set_bind_group(1, &self.objects.bind_group, &[]);
                pass.set_vertex_buffer(0, gpu.vertex_buffer().slice(..));
                pass.set_index_buffer(gpu.index_buffer().slice(..), gpu.index_format());
                for &id in scene.debug_primitives() {
                    let object = id.index() as u32;
                    pass.draw_indexed(0..gpu.index_count(), 0, object..object + 1);
                    debug_draws += 1;
                }
            }
        }

        drop(pass);
        self.stats.forward_draw_calls += forward_draws;
        self.stats.debug_draw_calls += debug_draws;
    }
}

fn clear_attachment(target: &RenderTarget) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view: target.view(),
        depth_slice: None,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            store: wgpu::StoreOp::Store,
        },
    })
}

fn create_lighting_inputs_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("LightingInputsLayout"),
        entries: &[
            texture_entry(0),
            texture_entry(1),
            texture_entry(2),
            texture_entry(3),
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            texture_entry(5),
            wgpu::BindGroupLayoutEntry {
                binding: 6,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                count: None,
            },
        ],
    })
}

fn create_gbuffer_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    instanced: bool,
) -> wgpu::RenderPipeline {
    let buffers: &[wgpu::VertexBufferLayout] = if instanced {
        &[Vertex::layout(), InstanceRaw::layout()]
    } else {
        &[Vertex::layout()]
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(if instanced {
            "GBufferInstancedPipeline"
        } else {
            "GBufferPipeline"
        }),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &GBuffer::color_formats(),
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            front_face: wgpu::FrontFace::Ccw,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn create_shadow_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    instanced: bool,
) -> wgpu::RenderPipeline {
    let buffers: &[wgpu::VertexBufferLayout] = if instanced {
        &[Vertex::layout(), InstanceRaw::layout()]
    } else {
        &[Vertex::layout()]
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(if instanced {
            "ShadowInstancedPipeline"
        } else {
            "ShadowPipeline"
        }),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers,
            compilation_options: Default::default(),
        },
        fragment: None,
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            front_face: wgpu::FrontFace::Ccw,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: wgpu::TextureFormat::Depth32Float,
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
    })
}

fn create_forward_stage_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &wgpu::ShaderModule,
    layouts: &[&wgpu::BindGroupLayout],
    buffers: &[wgpu::VertexBufferLayout],
    blend: bool,
) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: layouts,
        push_constant_ranges: &[],
    });

    let target = wgpu::ColorTargetState {
        format: HDR_FORMAT,
        blend: if blend {
            Some(wgpu::BlendState::ALPHA_BLENDING)
        } else {
            None
        },
        write_mask: wgpu::ColorWrites::ALL,
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(target)],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
            ..Default::default()
        },
        // Depth-tested against the shared scene depth, never written: the
        // single-writer rule for the G-buffer depth buffer.
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
