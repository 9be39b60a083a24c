pub mod cache;
pub mod handle;
pub mod mesh;

pub use cache::AssetCache;
pub use handle::Handle;
pub use mesh::{cube_mesh, GpuMesh, Mesh};

use crate::render::material::{Material, MaterialFlags, MaterialKind, MaterialShader, ShaderDomain};

/// Resource registry consumed by the frame renderer. Population (import,
/// serialization) happens elsewhere; the renderer only resolves handles and
/// falls back to the per-domain default materials.
pub struct Assets {
    pub meshes: AssetCache<Mesh>,
    pub shaders: AssetCache<MaterialShader>,
    pub materials: AssetCache<Material>,
    defaults: DefaultMaterials,
}

struct DefaultMaterials {
    mesh: Handle<Material>,
    skinned: Handle<Material>,
    terrain: Handle<Material>,
    mesh_instance: Handle<Material>,
}

impl Assets {
    /// Builds the registry with one default shader and one checker fallback
    /// material per built-in domain.
    pub fn new() -> Self {
        let mut shaders = AssetCache::new();
        let mut materials = AssetCache::new();

        let mut default_for = |domain: ShaderDomain, name: &str, kind: MaterialKind| {
            let shader = shaders.insert(MaterialShader::new(format!("{name}_default"), domain));
            materials.insert(
                Material::new(format!("{name}_fallback"), shader, domain, kind)
                    .with_flags(MaterialFlags::CHECKER),
            )
        };

        let defaults = DefaultMaterials {
            mesh: default_for(ShaderDomain::Mesh, "mesh", MaterialKind::Opaque),
            skinned: default_for(ShaderDomain::Skinned, "skinned", MaterialKind::Opaque),
            terrain: default_for(ShaderDomain::Terrain, "terrain", MaterialKind::Opaque),
            mesh_instance: default_for(
                ShaderDomain::MeshInstance,
                "mesh_instance",
                MaterialKind::MaskedFoliage,
            ),
        };

        Self {
            meshes: AssetCache::new(),
            shaders,
            materials,
            defaults,
        }
    }

    /// The fallback material for a primitive domain. Custom-domain primitives
    /// degrade to the static mesh fallback.
    pub fn default_material(&self, domain: ShaderDomain) -> Handle<Material> {
        match domain {
            ShaderDomain::Mesh | ShaderDomain::Custom => self.defaults.mesh,
            ShaderDomain::Skinned => self.defaults.skinned,
            ShaderDomain::Terrain => self.defaults.terrain,
            ShaderDomain::MeshInstance => self.defaults.mesh_instance,
        }
    }

    pub fn default_shader(&self, domain: ShaderDomain) -> Handle<MaterialShader> {
        let material = self.default_material(domain);
        self.materials
            .get(material)
            .map(|m| m.shader())
            .expect("default material always present")
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_domain() {
        let assets = Assets::new();
        for domain in [
            ShaderDomain::Mesh,
            ShaderDomain::Skinned,
            ShaderDomain::Terrain,
            ShaderDomain::MeshInstance,
            ShaderDomain::Custom,
        ] {
            let handle = assets.default_material(domain);
            let material = assets.materials.get(handle).unwrap();
            assert!(material.flags.contains(MaterialFlags::CHECKER));
        }
    }

    #[test]
    fn default_material_domain_matches_request() {
        let assets = Assets::new();
        let handle = assets.default_material(ShaderDomain::Skinned);
        assert_eq!(
            assets.materials.get(handle).unwrap().domain(),
            ShaderDomain::Skinned
        );
    }
}
