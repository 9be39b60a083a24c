use bitflags::bitflags;

use crate::asset::Handle;

/// Geometry category a shader is written for. A material may only be applied
/// to primitives of the same domain; the scene collector substitutes the
/// domain's default material on mismatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderDomain {
    Mesh,
    Skinned,
    Terrain,
    MeshInstance,
    Custom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Opaque,
    Masked,
    Translucent,
    MaskedFoliage,
}

impl MaterialKind {
    pub fn is_translucent(self) -> bool {
        matches!(self, Self::Translucent)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u32 {
        const DOUBLE_SIDED = 1 << 0;
        /// Procedural checker pattern; set on the per-domain fallback
        /// materials so broken assets degrade visibly instead of crashing.
        const CHECKER = 1 << 1;
        const EMISSIVE = 1 << 2;
    }
}

/// A shader program resource. The GPU module is optional: compilation
/// failures leave the resource in a valid-but-not-on-GPU state and the
/// renderer skips draws that would need it.
pub struct MaterialShader {
    name: String,
    domain: ShaderDomain,
    module: Option<wgpu::ShaderModule>,
}

impl MaterialShader {
    pub fn new(name: impl Into<String>, domain: ShaderDomain) -> Self {
        Self {
            name: name.into(),
            domain,
            module: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> ShaderDomain {
        self.domain
    }

    /// Compiles WGSL into a shader module. On validation failure the error is
    /// logged with the shader's name and the resource stays off-GPU.
    pub fn compile(&mut self, device: &wgpu::Device, source: &str) {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        match pollster::block_on(device.pop_error_scope()) {
            Some(error) => {
                log::error!("Shader '{}' failed to compile: {}", self.name, error);
                self.module = None;
            }
            None => self.module = Some(module),
        }
    }

    pub fn is_on_gpu(&self) -> bool {
        self.module.is_some()
    }

    pub fn module(&self) -> Option<&wgpu::ShaderModule> {
        self.module.as_ref()
    }
}

/// Material resource: a shader reference plus its parameter block. The domain
/// mirrors the shader's domain so the collector can validate without an
/// extra cache lookup.
#[derive(Clone, Debug)]
pub struct Material {
    name: String,
    shader: Handle<MaterialShader>,
    domain: ShaderDomain,
    kind: MaterialKind,
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub emissive_strength: f32,
    pub metallic: f32,
    pub roughness: f32,
    pub flags: MaterialFlags,
    shadow_shader: Option<Handle<MaterialShader>>,
}

impl Material {
    pub fn new(
        name: impl Into<String>,
        shader: Handle<MaterialShader>,
        domain: ShaderDomain,
        kind: MaterialKind,
    ) -> Self {
        Self {
            name: name.into(),
            shader,
            domain,
            kind,
            base_color: [1.0, 1.0, 1.0, 1.0],
            emissive: [0.0, 0.0, 0.0],
            emissive_strength: 0.0,
            metallic: 0.0,
            roughness: 0.8,
            flags: MaterialFlags::empty(),
            shadow_shader: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader(&self) -> Handle<MaterialShader> {
        self.shader
    }

    pub fn domain(&self) -> ShaderDomain {
        self.domain
    }

    pub fn kind(&self) -> MaterialKind {
        self.kind
    }

    pub fn shadow_shader(&self) -> Option<Handle<MaterialShader>> {
        self.shadow_shader
    }

    pub fn with_base_color(mut self, color: [f32; 4]) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_emissive(mut self, color: [f32; 3], strength: f32) -> Self {
        self.emissive = color;
        self.emissive_strength = strength;
        self.flags |= MaterialFlags::EMISSIVE;
        self
    }

    pub fn with_flags(mut self, flags: MaterialFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_shadow_shader(mut self, shader: Handle<MaterialShader>) -> Self {
        self.shadow_shader = Some(shader);
        self
    }
}

/// GPU mirror of the material parameter block.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialData {
    pub base_color: [f32; 4],
    pub emissive: [f32; 4],
    /// metallic, roughness, flag bits, kind.
    pub params: [f32; 4],
}

impl MaterialData {
    pub fn from_material(material: &Material) -> Self {
        Self {
            base_color: material.base_color,
            emissive: [
                material.emissive[0],
                material.emissive[1],
                material.emissive[2],
                material.emissive_strength,
            ],
            params: [
                material.metallic,
                material.roughness,
                material.flags.bits() as f32,
                material.kind() as u32 as f32,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_pbr_factors() {
        let shader: Handle<MaterialShader> = Handle::new(0);
        let material = Material::new("m", shader, ShaderDomain::Mesh, MaterialKind::Opaque)
            .with_metallic(2.0)
            .with_roughness(-1.0);
        assert_eq!(material.metallic, 1.0);
        assert_eq!(material.roughness, 0.0);
    }

    #[test]
    fn material_data_packs_flags() {
        let shader: Handle<MaterialShader> = Handle::new(0);
        let material = Material::new("m", shader, ShaderDomain::Mesh, MaterialKind::Masked)
            .with_flags(MaterialFlags::CHECKER);
        let data = MaterialData::from_material(&material);
        assert_eq!(data.params[2] as u32, MaterialFlags::CHECKER.bits());
        assert_eq!(data.params[3] as u32, MaterialKind::Masked as u32);
    }

    #[test]
    fn new_shader_is_not_on_gpu() {
        let shader = MaterialShader::new("pbr", ShaderDomain::Mesh);
        assert!(!shader.is_on_gpu());
        assert!(shader.module().is_none());
    }
}
