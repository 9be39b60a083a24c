use std::mem;
use std::num::NonZeroU64;

use glam::UVec2;

use crate::render::pass::fullscreen_pipeline;
use crate::render::target::{RenderTarget, LDR_FORMAT};
use crate::render::uniforms::{FxaaUniform, TonemapUniform};
use crate::settings::FxaaSettings;

/// Final image chain: tonemap the HDR lighting result to LDR, then FXAA into
/// the caller's target.
pub(crate) struct PostProcess {
    fxaa_settings: FxaaSettings,
    exposure: f32,
    gamma: f32,
    tonemap_uniform_buffer: wgpu::Buffer,
    fxaa_uniform_buffer: wgpu::Buffer,
    tonemap_uniform_bind_group: wgpu::BindGroup,
    fxaa_uniform_bind_group: wgpu::BindGroup,
    inputs_layout: wgpu::BindGroupLayout,
    tonemap_inputs: Option<wgpu::BindGroup>,
    fxaa_inputs: Option<wgpu::BindGroup>,
    tonemap_pipeline: wgpu::RenderPipeline,
    fxaa_pipeline: wgpu::RenderPipeline,
    ldr_target: RenderTarget,
    linear_sampler: wgpu::Sampler,
}

impl PostProcess {
    pub(crate) fn new(
        device: &wgpu::Device,
        size: UVec2,
        output_format: wgpu::TextureFormat,
        fxaa_settings: FxaaSettings,
    ) -> Self {
        let tonemap_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("TonemapUniformBuffer"),
            size: mem::size_of::<TonemapUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let fxaa_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FxaaUniformBuffer"),
            size: mem::size_of::<FxaaUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_layout = |label: &str, size: usize| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(NonZeroU64::new(size as u64).unwrap()),
                    },
                    count: None,
                }],
            })
        };

        let tonemap_layout = uniform_layout("TonemapUniformLayout", mem::size_of::<TonemapUniform>());
        let fxaa_layout = uniform_layout("FxaaUniformLayout", mem::size_of::<FxaaUniform>());

        let tonemap_uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("TonemapUniformBindGroup"),
            layout: &tonemap_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: tonemap_uniform_buffer.as_entire_binding(),
            }],
        });
        let fxaa_uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FxaaUniformBindGroup"),
            layout: &fxaa_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: fxaa_uniform_buffer.as_entire_binding(),
            }],
        });

        let inputs_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("PostProcessInputsLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
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

        let tonemap_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("TonemapShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/tonemap.wgsl").into()),
        });
        let fxaa_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("FxaaShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/fxaa.wgsl").into()),
        });

        let tonemap_pipeline = fullscreen_pipeline(
            device,
            "TonemapPipeline",
            &tonemap_shader,
            &[&tonemap_layout, &inputs_layout],
            LDR_FORMAT,
        );
        let fxaa_pipeline = fullscreen_pipeline(
            device,
            "FxaaPipeline",
            &fxaa_shader,
            &[&fxaa_layout, &inputs_layout],
            output_format,
        );

        let ldr_target = RenderTarget::new(device, "PostProcessLdr", size, LDR_FORMAT);

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("PostProcessSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            fxaa_settings,
            exposure: 1.0,
            gamma: 2.2,
            tonemap_uniform_buffer,
            fxaa_uniform_buffer,
            tonemap_uniform_bind_group,
            fxaa_uniform_bind_group,
            inputs_layout,
            tonemap_inputs: None,
            fxaa_inputs: None,
            tonemap_pipeline,
            fxaa_pipeline,
            ldr_target,
            linear_sampler,
        }
    }

    pub(crate) fn set_exposure(&mut self, exposure: f32) {
        self.exposure = exposure.max(0.0);
    }

    pub(crate) fn resize(&mut self, device: &wgpu::Device, size: UVec2) {
        self.ldr_target = RenderTarget::new(device, "PostProcessLdr", size, LDR_FORMAT);
        self.tonemap_inputs = None;
        self.fxaa_inputs = None;
    }

    /// Rebinds the HDR input; required after resize and on first use.
    pub(crate) fn bind_inputs(&mut self, device: &wgpu::Device, hdr_view: &wgpu::TextureView) {
        let make = |view: &wgpu::TextureView, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.inputs_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
                    },
                ],
            })
        };
        self.tonemap_inputs = Some(make(hdr_view, "TonemapInputs"));
        self.fxaa_inputs = Some(make(self.ldr_target.view(), "FxaaInputs"));
    }

    pub(crate) fn update(&self, queue: &wgpu::Queue, size: UVec2) {
        let tonemap = TonemapUniform {
            params: [self.exposure, self.gamma, 0.0, 0.0],
        };
        queue.write_buffer(
            &self.tonemap_uniform_buffer,
            0,
            bytemuck::bytes_of(&tonemap),
        );

        // With FXAA off the thresholds go above any possible contrast and
        // the pass degrades to a plain copy into the output.
        let (threshold, threshold_min) = if self.fxaa_settings.enabled {
            (
                self.fxaa_settings.edge_threshold,
                self.fxaa_settings.edge_threshold_min,
            )
        } else {
            (1e5, 1e5)
        };
        let fxaa = FxaaUniform {
            params: [
                1.0 / size.x.max(1) as f32,
                1.0 / size.y.max(1) as f32,
                threshold,
                threshold_min,
            ],
        };
        queue.write_buffer(&self.fxaa_uniform_buffer, 0, bytemuck::bytes_of(&fxaa));
    }

    /// Tonemap into the LDR scratch target, then FXAA into `output`.
    pub(crate) fn execute(&self, encoder: &mut wgpu::CommandEncoder, output: &wgpu::TextureView) {
        let (Some(tonemap_inputs), Some(fxaa_inputs)) =
            (self.tonemap_inputs.as_ref(), self.fxaa_inputs.as_ref())
        else {
            log::warn!("Post-process inputs not bound; skipping");
            return;
        };

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("TonemapPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.ldr_target.view(),
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
            pass.set_pipeline(&self.tonemap_pipeline);
            pass.set_bind_group(0, &self.tonemap_uniform_bind_group, &[]);
            pass.set_bind_group(1, tonemap_inputs, &[]);
            pass.draw(0..3, 0..1);
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("FxaaPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: output,
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
            pass.set_pipeline(&self.fxaa_pipeline);
            pass.set_bind_group(0, &self.fxaa_uniform_bind_group, &[]);
            pass.set_bind_group(1, fxaa_inputs, &[]);
            pass.draw(0..3, 0..1);
        }
    }
}
