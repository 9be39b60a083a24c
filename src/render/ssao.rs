use std::mem;
use std::num::NonZeroU64;

use glam::UVec2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

use crate::render::pass::fullscreen_pipeline;
use crate::render::scene::SceneView;
use crate::render::target::{RenderTarget, AO_FORMAT};
use crate::render::uniforms::{BlurUniform, SsaoUniform};
use crate::settings::SsaoSettings;

const KERNEL_SIZE: usize = 32;
const NOISE_SIZE: u32 = 4;

/// Screen-space ambient occlusion: a half-precision AO estimate from depth
/// and normals, box-blurred before the lighting pass samples it.
pub(crate) struct SsaoResources {
    settings: SsaoSettings,
    uniform_buffer: wgpu::Buffer,
    _kernel_buffer: wgpu::Buffer,
    blur_uniform_buffer: wgpu::Buffer,
    _noise_texture: wgpu::Texture,
    noise_view: wgpu::TextureView,
    point_sampler: wgpu::Sampler,
    uniform_bind_group: wgpu::BindGroup,
    inputs_layout: wgpu::BindGroupLayout,
    inputs_bind_group: Option<wgpu::BindGroup>,
    blur_uniform_bind_group: wgpu::BindGroup,
    blur_inputs_layout: wgpu::BindGroupLayout,
    blur_bind_group: Option<wgpu::BindGroup>,
    ssao_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    raw_target: RenderTarget,
    blurred_target: RenderTarget,
}

impl SsaoResources {
    pub(crate) fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        size: UVec2,
        settings: SsaoSettings,
    ) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SsaoUniformBuffer"),
            size: mem::size_of::<SsaoUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let kernel = build_kernel();
        let kernel_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SsaoKernelBuffer"),
            contents: bytemuck::cast_slice(&kernel),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let blur_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SsaoBlurUniformBuffer"),
            size: mem::size_of::<BlurUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let (noise_texture, noise_view) = build_noise_texture(device, queue);

        let point_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("SsaoPointSampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SsaoUniformLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            NonZeroU64::new(mem::size_of::<SsaoUniform>() as u64).unwrap(),
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
                        min_binding_size: Some(
                            NonZeroU64::new((KERNEL_SIZE * 16) as u64).unwrap(),
                        ),
                    },
                    count: None,
                },
            ],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SsaoUniformBindGroup"),
            layout: &uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: kernel_buffer.as_entire_binding(),
                },
            ],
        });

        let inputs_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SsaoInputsLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let blur_uniform_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("SsaoBlurUniformLayout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            NonZeroU64::new(mem::size_of::<BlurUniform>() as u64).unwrap(),
                        ),
                    },
                    count: None,
                }],
            });

        let blur_uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SsaoBlurUniformBindGroup"),
            layout: &blur_uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: blur_uniform_buffer.as_entire_binding(),
            }],
        });

        let blur_inputs_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("SsaoBlurInputsLayout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                        count: None,
                    },
                ],
            });

        let ssao_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("SsaoShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/ssao.wgsl").into()),
        });
        let blur_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("SsaoBlurShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/ssao_blur.wgsl").into()),
        });

        let ssao_pipeline = fullscreen_pipeline(
            device,
            "SsaoPipeline",
            &ssao_shader,
            &[&uniform_layout, &inputs_layout],
            AO_FORMAT,
        );
        let blur_pipeline = fullscreen_pipeline(
            device,
            "SsaoBlurPipeline",
            &blur_shader,
            &[&blur_uniform_layout, &blur_inputs_layout],
            AO_FORMAT,
        );

        let raw_target = RenderTarget::new(device, "SsaoRaw", size, AO_FORMAT);
        let blurred_target = RenderTarget::new(device, "SsaoBlurred", size, AO_FORMAT);

        Self {
            settings,
            uniform_buffer,
            _kernel_buffer: kernel_buffer,
            blur_uniform_buffer,
            _noise_texture: noise_texture,
            noise_view,
            point_sampler,
            uniform_bind_group,
            inputs_layout,
            inputs_bind_group: None,
            blur_uniform_bind_group,
            blur_inputs_layout,
            blur_bind_group: None,
            ssao_pipeline,
            blur_pipeline,
            raw_target,
            blurred_target,
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// The lighting pass samples this.
    pub(crate) fn output_view(&self) -> &wgpu::TextureView {
        self.blurred_target.view()
    }

    pub(crate) fn resize(&mut self, device: &wgpu::Device, size: UVec2) {
        self.raw_target = RenderTarget::new(device, "SsaoRaw", size, AO_FORMAT);
        self.blurred_target = RenderTarget::new(device, "SsaoBlurred", size, AO_FORMAT);
        self.inputs_bind_group = None;
        self.blur_bind_group = None;
    }

    /// Rebinds the G-buffer inputs; required after resize and on first use.
    pub(crate) fn bind_inputs(
        &mut self,
        device: &wgpu::Device,
        depth_view: &wgpu::TextureView,
        normal_view: &wgpu::TextureView,
    ) {
        self.inputs_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SsaoInputsBindGroup"),
            layout: &self.inputs_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(normal_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.noise_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.point_sampler),
                },
            ],
        }));

        self.blur_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SsaoBlurBindGroup"),
            layout: &self.blur_inputs_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(self.raw_target.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.point_sampler),
                },
            ],
        }));
    }

    pub(crate) fn update(&self, queue: &wgpu::Queue, view: &SceneView, size: UVec2) {
        let uniform = SsaoUniform {
            proj: view.proj.to_cols_array_2d(),
            inv_proj: view.proj.inverse().to_cols_array_2d(),
            view: view.view.to_cols_array_2d(),
            params: [
                self.settings.radius,
                self.settings.bias,
                self.settings.intensity,
                KERNEL_SIZE as f32,
            ],
            resolution: [
                size.x as f32,
                size.y as f32,
                size.x as f32 / NOISE_SIZE as f32,
                size.y as f32 / NOISE_SIZE as f32,
            ],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));

        let blur = BlurUniform {
            texel: [1.0 / size.x as f32, 1.0 / size.y as f32, 0.0, 0.0],
        };
        queue.write_buffer(&self.blur_uniform_buffer, 0, bytemuck::bytes_of(&blur));
    }

    /// Occlusion estimate then box blur; runs between the geometry pass and
    /// the lighting pass.
    pub(crate) fn render(&self, encoder: &mut wgpu::CommandEncoder) {
        let (Some(inputs), Some(blur_inputs)) =
            (self.inputs_bind_group.as_ref(), self.blur_bind_group.as_ref())
        else {
            log::warn!("SSAO inputs not bound; skipping the pass");
            return;
        };

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("SsaoPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.raw_target.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.ssao_pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_bind_group(1, inputs, &[]);
            pass.draw(0..3, 0..1);
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("SsaoBlurPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.blurred_target.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.blur_pipeline);
            pass.set_bind_group(0, &self.blur_uniform_bind_group, &[]);
            pass.set_bind_group(1, blur_inputs, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    /// Clears the blurred buffer to "no occlusion" so the lighting pass can
    /// keep sampling it while SSAO is disabled.
    pub(crate) fn render_disabled(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("SsaoDisabledClear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.blurred_target.view(),
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
}

/// Hemisphere sample kernel, denser near the origin.
fn build_kernel() -> Vec<[f32; 4]> {
    let mut rng = SmallRng::seed_from_u64(0x5510);
    (0..KERNEL_SIZE)
        .map(|i| {
            let mut sample = glam::Vec3::new(
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(0.0f32..1.0),
            )
            .normalize_or_zero()
                * rng.gen_range(0.0f32..1.0);

            let scale = i as f32 / KERNEL_SIZE as f32;
            sample *= 0.1 + 0.9 * scale * scale;
            [sample.x, sample.y, sample.z, 0.0]
        })
        .collect()
}

/// 4x4 tile of random rotation vectors, repeated across the screen.
fn build_noise_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> (wgpu::Texture, wgpu::TextureView) {
    let mut rng = SmallRng::seed_from_u64(0x0a0e);
    let mut pixels = Vec::with_capacity((NOISE_SIZE * NOISE_SIZE * 4) as usize);
    for _ in 0..NOISE_SIZE * NOISE_SIZE {
        pixels.push(rng.gen_range(0u8..=255));
        pixels.push(rng.gen_range(0u8..=255));
        pixels.push(128);
        pixels.push(255);
    }

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("SsaoNoise"),
        size: wgpu::Extent3d {
            width: NOISE_SIZE,
            height: NOISE_SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(NOISE_SIZE * 4),
            rows_per_image: Some(NOISE_SIZE),
        },
        wgpu::Extent3d {
            width: NOISE_SIZE,
            height: NOISE_SIZE,
            depth_or_array_layers: 1,
        },
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

