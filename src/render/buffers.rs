use std::mem;
use std::num::NonZeroU64;

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::asset::Assets;
use crate::render::light::{LightsUniform, RenderLight};
use crate::render::material::MaterialData;
use crate::render::primitive::{PrimitiveArena, PrimitiveKind};
use crate::render::scene::SceneEnvironment;
use crate::render::uniforms::{ForwardUniform, FrameUniform, ObjectData};

/// Per-frame camera constants (one uniform, bound as group 0 by every
/// geometry pass).
pub(crate) struct FrameBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
}

impl FrameBuffer {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let initial = FrameUniform::default();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("FrameBuffer"),
            contents: bytemuck::bytes_of(&initial),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("FrameBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(
                        NonZeroU64::new(mem::size_of::<FrameUniform>() as u64).unwrap(),
                    ),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FrameBindGroup"),
            layout: &bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            buffer,
            bind_group,
            bind_layout,
        }
    }

    pub(crate) fn update(&self, queue: &wgpu::Queue, uniform: &FrameUniform) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(uniform));
    }
}

/// Growable storage for this frame's primitives and the material parameter
/// table. Slot `i` of the object buffer mirrors arena primitive `i`, so
/// draws select their record through the instance index.
pub(crate) struct ObjectsBuffer {
    pub(crate) buffer: wgpu::Buffer,
    materials_buffer: wgpu::Buffer,
    pub(crate) capacity: u32,
    materials_capacity: u32,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
    scratch: Vec<ObjectData>,
    material_scratch: Vec<MaterialData>,
}

impl ObjectsBuffer {
    pub(crate) fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ObjectsBindLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let buffer = Self::create_objects_buffer(device, capacity);
        let materials_capacity = 256;
        let materials_buffer = Self::create_materials_buffer(device, materials_capacity);
        let bind_group =
            Self::create_bind_group(device, &bind_layout, &buffer, &materials_buffer);

        Self {
            buffer,
            materials_buffer,
            capacity,
            materials_capacity,
            bind_group,
            bind_layout,
            scratch: Vec::with_capacity(capacity as usize),
            material_scratch: Vec::new(),
        }
    }

    fn create_objects_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ObjectsBuffer"),
            size: (capacity as usize * mem::size_of::<ObjectData>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_materials_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("MaterialsBuffer"),
            size: (capacity as usize * mem::size_of::<MaterialData>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        objects: &wgpu::Buffer,
        materials: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ObjectsBindGroup"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: objects.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: materials.as_entire_binding(),
                },
            ],
        })
    }

    /// Uploads one record per arena primitive plus the whole material table.
    pub(crate) fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        primitives: &PrimitiveArena,
        assets: &Assets,
    ) {
        self.scratch.clear();
        for (_, primitive) in primitives.iter() {
            let mut data = ObjectData::new(
                primitive.transform,
                primitive.normal_matrix,
                primitive.material.index(),
            )
            .with_lights(&primitive.lights);
            if let PrimitiveKind::DebugShape { color } = &primitive.kind {
                data = data.with_custom(*color);
            }
            self.scratch.push(data);
        }

        self.material_scratch.clear();
        for (_, material) in assets.materials.iter() {
            self.material_scratch
                .push(MaterialData::from_material(material));
        }

        let mut rebind = false;
        let required = self.scratch.len() as u32;
        if required > self.capacity {
            let new_capacity = required.max(self.capacity * 2).max(1);
            log::info!("Growing objects buffer: {} -> {}", self.capacity, new_capacity);
            self.buffer = Self::create_objects_buffer(device, new_capacity);
            self.capacity = new_capacity;
            rebind = true;
        }

        let materials_required = self.material_scratch.len() as u32;
        if materials_required > self.materials_capacity {
            let new_capacity = materials_required.max(self.materials_capacity * 2).max(1);
            log::info!(
                "Growing materials buffer: {} -> {}",
                self.materials_capacity,
                new_capacity
            );
            self.materials_buffer = Self::create_materials_buffer(device, new_capacity);
            self.materials_capacity = new_capacity;
            rebind = true;
        }

        if rebind {
            self.bind_group = Self::create_bind_group(
                device,
                &self.bind_layout,
                &self.buffer,
                &self.materials_buffer,
            );
        }

        if !self.scratch.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&self.scratch));
        }
        if !self.material_scratch.is_empty() {
            queue.write_buffer(
                &self.materials_buffer,
                0,
                bytemuck::cast_slice(&self.material_scratch),
            );
        }
    }
}

/// Lights array plus the forward-pass sun/ambient constants (group 2 of the
/// forward pipelines).
pub(crate) struct LightsBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) forward_buffer: wgpu::Buffer,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
}

impl LightsBuffer {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let initial = LightsUniform::zeroed();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("LightsBuffer"),
            contents: bytemuck::bytes_of(&initial),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let forward_initial = ForwardUniform::zeroed();
        let forward_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ForwardUniformBuffer"),
            contents: bytemuck::bytes_of(&forward_initial),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LightsBindLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            NonZeroU64::new(mem::size_of::<LightsUniform>() as u64).unwrap(),
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
                            NonZeroU64::new(mem::size_of::<ForwardUniform>() as u64).unwrap(),
                        ),
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LightsBindGroup"),
            layout: &bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: forward_buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            buffer,
            forward_buffer,
            bind_group,
            bind_layout,
        }
    }

    pub(crate) fn update(
        &self,
        queue: &wgpu::Queue,
        lights: &[RenderLight],
        environment: &SceneEnvironment,
        ambient: f32,
    ) {
        let data = LightsUniform::from_lights(lights);
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&data));
        let forward = ForwardUniform::build(environment, ambient);
        queue.write_buffer(&self.forward_buffer, 0, bytemuck::bytes_of(&forward));
    }
}
