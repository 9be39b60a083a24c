use std::mem;
use std::num::NonZeroU64;
use std::path::Path;

use glam::{UVec2, Vec3};
use half::f16;

use crate::render::pass::fullscreen_pipeline;
use crate::render::scene::SceneEnvironment;
use crate::render::target::RenderTarget;
use crate::render::uniforms::{cube_face_basis, FaceUniform, PrefilterUniform};

const ENV_SIZE: u32 = 128;
const ENV_MIPS: u32 = 5;
const BRDF_LUT_SIZE: u32 = 256;
const ENV_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Image-based lighting sources. Two filtered cube maps exist side by side:
/// the static one decoded from disk at startup, and the dynamic sky one
/// refiltered only when the sky is marked dirty. The lighting pass binds one
/// of them per frame.
pub(crate) struct EnvironmentResources {
    sampler: wgpu::Sampler,
    _brdf_lut: RenderTarget,
    _static_filtered: CubeMap,
    sky_base: CubeMap,
    sky_filtered: CubeMap,
    static_bind_group: wgpu::BindGroup,
    sky_bind_group: wgpu::BindGroup,
    bind_layout: wgpu::BindGroupLayout,
    sky_pipeline: wgpu::RenderPipeline,
    sky_uniform_buffer: wgpu::Buffer,
    sky_uniform_bind_group: wgpu::BindGroup,
    prefilter_pipeline: wgpu::RenderPipeline,
    prefilter_uniform_buffer: wgpu::Buffer,
    prefilter_bind_group: wgpu::BindGroup,
    prefilter_src_layout: wgpu::BindGroupLayout,
    staging_buffer: wgpu::Buffer,
    sky_dirty: bool,
}

struct CubeMap {
    texture: wgpu::Texture,
    cube_view: wgpu::TextureView,
    mips: u32,
}

impl CubeMap {
    fn new(device: &wgpu::Device, label: &str, size: u32, mips: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: mips,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ENV_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let cube_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Self {
            texture,
            cube_view,
            mips,
        }
    }

    fn face_view(&self, face: u32, mip: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("CubeFaceView"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: face,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }
}

impl EnvironmentResources {
    pub(crate) fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        environment_path: Option<&Path>,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("EnvironmentSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: ENV_MIPS as f32,
            ..Default::default()
        });

        // One-time BRDF integration.
        let brdf_lut = RenderTarget::new(
            device,
            "BrdfLut",
            UVec2::splat(BRDF_LUT_SIZE),
            ENV_FORMAT,
        );
        let brdf_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("BrdfLutShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/brdf_lut.wgsl").into()),
        });
        let brdf_pipeline =
            fullscreen_pipeline(device, "BrdfLutPipeline", &brdf_shader, &[], ENV_FORMAT);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("BrdfLutEncoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("BrdfLutPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: brdf_lut.view(),
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
            pass.set_pipeline(&brdf_pipeline);
            pass.draw(0..3, 0..1);
        }
        queue.submit(Some(encoder.finish()));

        // Static environment: decoded from an equirectangular HDR when one
        // is configured, otherwise a flat gray fallback.
        let static_base = CubeMap::new(device, "StaticEnvBase", ENV_SIZE, 1);
        match environment_path {
            Some(path) => match load_equirect_faces(path) {
                Ok(faces) => upload_faces(queue, &static_base, &faces),
                Err(err) => {
                    log::error!("Failed to load environment {:?}: {}", path, err);
                    upload_flat_faces(queue, &static_base, [0.35, 0.37, 0.40]);
                }
            },
            None => upload_flat_faces(queue, &static_base, [0.35, 0.37, 0.40]),
        }

        let static_filtered = CubeMap::new(device, "StaticEnvFiltered", ENV_SIZE, ENV_MIPS);
        let sky_base = CubeMap::new(device, "SkyEnvBase", ENV_SIZE, 1);
        let sky_filtered = CubeMap::new(device, "SkyEnvFiltered", ENV_SIZE, ENV_MIPS);

        // Sky face rendering.
        let sky_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("SkyEnvShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/sky_env.wgsl").into()),
        });
        let sky_uniform_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("SkyEnvUniformLayout"),
                entries: &[uniform_entry(0, mem::size_of::<FaceUniform>())],
            });
        let sky_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SkyEnvUniformBuffer"),
            size: mem::size_of::<FaceUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sky_uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SkyEnvUniformBindGroup"),
            layout: &sky_uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: sky_uniform_buffer.as_entire_binding(),
            }],
        });
        let sky_pipeline = fullscreen_pipeline(
            device,
            "SkyEnvPipeline",
            &sky_shader,
            &[&sky_uniform_layout],
            ENV_FORMAT,
        );

        // GGX prefilter chain.
        let prefilter_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("EnvPrefilterShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/env_prefilter.wgsl").into()),
        });
        let prefilter_uniform_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("EnvPrefilterUniformLayout"),
                entries: &[uniform_entry(0, mem::size_of::<PrefilterUniform>())],
            });
        let prefilter_src_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("EnvPrefilterSrcLayout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::Cube,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });
        let prefilter_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("EnvPrefilterUniformBuffer"),
            size: mem::size_of::<PrefilterUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let prefilter_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("EnvPrefilterUniformBindGroup"),
            layout: &prefilter_uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: prefilter_uniform_buffer.as_entire_binding(),
            }],
        });
        let prefilter_pipeline = fullscreen_pipeline(
            device,
            "EnvPrefilterPipeline",
            &prefilter_shader,
            &[&prefilter_uniform_layout, &prefilter_src_layout],
            ENV_FORMAT,
        );

        // Uniform slots for every (face, mip) draw of one filtering run; the
        // encoder copies slot -> uniform buffer between passes.
        let slot_count = (6 * ENV_MIPS.max(1)) as u64;
        let slot_size = mem::size_of::<FaceUniform>().max(mem::size_of::<PrefilterUniform>());
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("EnvStagingBuffer"),
            size: slot_size as u64 * slot_count,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("EnvironmentBindLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let make_bind_group = |cube: &CubeMap, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &bind_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&cube.cube_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(brdf_lut.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            })
        };

        let static_bind_group = make_bind_group(&static_filtered, "StaticEnvBindGroup");
        let sky_bind_group = make_bind_group(&sky_filtered, "SkyEnvBindGroup");

        let resources = Self {
            sampler,
            _brdf_lut: brdf_lut,
            _static_filtered: static_filtered,
            sky_base,
            sky_filtered,
            static_bind_group,
            sky_bind_group,
            bind_layout,
            sky_pipeline,
            sky_uniform_buffer,
            sky_uniform_bind_group,
            prefilter_pipeline,
            prefilter_uniform_buffer,
            prefilter_bind_group,
            prefilter_src_layout,
            staging_buffer,
            sky_dirty: true,
        };

        resources.prefilter(device, queue, &static_base.cube_view, &resources._static_filtered);

        resources
    }

    pub(crate) fn bind_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_layout
    }

    /// Per-frame binary switch: filtered dynamic sky when the scene requests
    /// a sky, the static map otherwise.
    pub(crate) fn bind_group(&self, sky_enabled: bool) -> &wgpu::BindGroup {
        if sky_enabled {
            &self.sky_bind_group
        } else {
            &self.static_bind_group
        }
    }

    /// Marks the dynamic sky for refiltering on the next frame. Filtering is
    /// expensive, so it never runs per frame.
    pub(crate) fn request_update_sky(&mut self) {
        self.sky_dirty = true;
    }

    /// Renders and refilters the dynamic sky cube if it was marked dirty.
    pub(crate) fn update_sky(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        environment: &SceneEnvironment,
    ) {
        if !self.sky_dirty {
            return;
        }
        self.sky_dirty = false;

        let slot_size = mem::size_of::<FaceUniform>()
            .max(mem::size_of::<PrefilterUniform>()) as u64;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("SkyEnvEncoder"),
        });

        for face in 0..6u32 {
            let (forward, right, up) = cube_face_basis(face as usize);
            let uniform = FaceUniform {
                forward: pad(forward),
                right: pad(right),
                up: pad(up),
                sun: [
                    environment.sun_direction.x,
                    environment.sun_direction.y,
                    environment.sun_direction.z,
                    if environment.sun_enabled {
                        environment.sun_power
                    } else {
                        0.0
                    },
                ],
                sun_color: [
                    environment.sun_color.x,
                    environment.sun_color.y,
                    environment.sun_color.z,
                    1.0,
                ],
            };
            let offset = face as u64 * slot_size;
            queue.write_buffer(&self.staging_buffer, offset, bytemuck::bytes_of(&uniform));

            encoder.copy_buffer_to_buffer(
                &self.staging_buffer,
                offset,
                &self.sky_uniform_buffer,
                0,
                mem::size_of::<FaceUniform>() as u64,
            );

            let view = self.sky_base.face_view(face, 0);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("SkyEnvFacePass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
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
            pass.set_pipeline(&self.sky_pipeline);
            pass.set_bind_group(0, &self.sky_uniform_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        queue.submit(Some(encoder.finish()));

        self.prefilter(device, queue, &self.sky_base.cube_view, &self.sky_filtered);
    }

    /// Runs the GGX mip chain: roughness and sample count grow per mip.
    fn prefilter(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        src_view: &wgpu::TextureView,
        dst: &CubeMap,
    ) {
        let src_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("EnvPrefilterSrcBindGroup"),
            layout: &self.prefilter_src_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let slot_size = mem::size_of::<FaceUniform>()
            .max(mem::size_of::<PrefilterUniform>()) as u64;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("EnvPrefilterEncoder"),
        });

        for mip in 0..dst.mips {
            let roughness = mip as f32 / (dst.mips - 1).max(1) as f32;
            let sample_count = (32u32 << mip).min(512);

            for face in 0..6u32 {
                let (forward, right, up) = cube_face_basis(face as usize);
                let uniform = PrefilterUniform {
                    forward: pad(forward),
                    right: pad(right),
                    up: pad(up),
                    params: [roughness, sample_count as f32, 0.0, 0.0],
                };
                let offset = (mip * 6 + face) as u64 * slot_size;
                queue.write_buffer(&self.staging_buffer, offset, bytemuck::bytes_of(&uniform));

                encoder.copy_buffer_to_buffer(
                    &self.staging_buffer,
                    offset,
                    &self.prefilter_uniform_buffer,
                    0,
                    mem::size_of::<PrefilterUniform>() as u64,
                );

                let view = dst.face_view(face, mip);
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("EnvPrefilterPass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
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
                pass.set_pipeline(&self.prefilter_pipeline);
                pass.set_bind_group(0, &self.prefilter_bind_group, &[]);
                pass.set_bind_group(1, &src_bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }

        queue.submit(Some(encoder.finish()));
    }
}

fn pad(v: Vec3) -> [f32; 4] {
    [v.x, v.y, v.z, 0.0]
}

fn uniform_entry(binding: u32, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: Some(NonZeroU64::new(size as u64).unwrap()),
        },
        count: None,
    }
}

/// Projects an equirectangular HDR image onto six half-float cube faces on
/// the CPU. Resolution is modest; the prefilter chain smooths the rest.
fn load_equirect_faces(path: &Path) -> Result<Vec<Vec<u16>>, image::ImageError> {
    let image = image::open(path)?.into_rgba32f();
    let (width, height) = image.dimensions();

    let mut faces = Vec::with_capacity(6);
    for face in 0..6 {
        let (forward, right, up) = cube_face_basis(face);
        let mut pixels = Vec::with_capacity((ENV_SIZE * ENV_SIZE * 4) as usize);
        for y in 0..ENV_SIZE {
            for x in 0..ENV_SIZE {
                let u = (x as f32 + 0.5) / ENV_SIZE as f32 * 2.0 - 1.0;
                let v = (y as f32 + 0.5) / ENV_SIZE as f32 * 2.0 - 1.0;
                let dir = (forward + right * u + up * v).normalize();

                let phi = dir.z.atan2(dir.x);
                let theta = dir.y.clamp(-1.0, 1.0).acos();
                let sx = ((phi / (2.0 * std::f32::consts::PI) + 0.5)
                    * (width - 1) as f32) as u32;
                let sy = ((theta / std::f32::consts::PI) * (height - 1) as f32) as u32;

                let texel = image.get_pixel(sx.min(width - 1), sy.min(height - 1));
                pixels.push(f16::from_f32(texel.0[0]).to_bits());
                pixels.push(f16::from_f32(texel.0[1]).to_bits());
                pixels.push(f16::from_f32(texel.0[2]).to_bits());
                pixels.push(f16::from_f32(1.0).to_bits());
            }
        }
        faces.push(pixels);
    }
    Ok(faces)
}

fn upload_faces(queue: &wgpu::Queue, cube: &CubeMap, faces: &[Vec<u16>]) {
    for (face, pixels) in faces.iter().enumerate() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &cube.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: face as u32,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(pixels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(ENV_SIZE * 8),
                rows_per_image: Some(ENV_SIZE),
            },
            wgpu::Extent3d {
                width: ENV_SIZE,
                height: ENV_SIZE,
                depth_or_array_layers: 1,
            },
        );
    }
}

fn upload_flat_faces(queue: &wgpu::Queue, cube: &CubeMap, color: [f32; 3]) {
    let mut pixels = Vec::with_capacity((ENV_SIZE * ENV_SIZE * 4) as usize);
    for _ in 0..ENV_SIZE * ENV_SIZE {
        pixels.push(f16::from_f32(color[0]).to_bits());
        pixels.push(f16::from_f32(color[1]).to_bits());
        pixels.push(f16::from_f32(color[2]).to_bits());
        pixels.push(f16::from_f32(1.0).to_bits());
    }
    let faces: Vec<Vec<u16>> = (0..6).map(|_| pixels.clone()).collect();
    upload_faces(queue, cube, &faces);
}
