use glam::{Mat4, Vec4};

use crate::asset::{Handle, Mesh};
use crate::render::light::ForwardLightList;
use crate::render::material::{Material, ShaderDomain};

/// Dense handle into a [`PrimitiveArena`]. Valid only for the frame the
/// primitive was allocated in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrimitiveId(u32);

impl PrimitiveId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_raw(index: u32) -> Self {
        Self(index)
    }
}

/// The variant payload of a draw unit.
#[derive(Clone, Debug)]
pub enum PrimitiveKind {
    Mesh {
        mesh: Handle<Mesh>,
    },
    SkinnedMesh {
        mesh: Handle<Mesh>,
    },
    Terrain {
        mesh: Handle<Mesh>,
        bin: u32,
    },
    /// One GPU-instanced draw covering every gathered instance of a foliage
    /// layer this frame.
    FoliageInstances {
        mesh: Handle<Mesh>,
        transforms: Vec<Mat4>,
    },
    DebugShape {
        color: Vec4,
    },
}

impl PrimitiveKind {
    pub fn domain(&self) -> ShaderDomain {
        match self {
            Self::Mesh { .. } | Self::DebugShape { .. } => ShaderDomain::Mesh,
            Self::SkinnedMesh { .. } => ShaderDomain::Skinned,
            Self::Terrain { .. } => ShaderDomain::Terrain,
            Self::FoliageInstances { .. } => ShaderDomain::MeshInstance,
        }
    }

    pub fn mesh(&self) -> Option<Handle<Mesh>> {
        match self {
            Self::Mesh { mesh }
            | Self::SkinnedMesh { mesh }
            | Self::Terrain { mesh, .. }
            | Self::FoliageInstances { mesh, .. } => Some(*mesh),
            Self::DebugShape { .. } => None,
        }
    }
}

/// One draw unit for the current frame. Owned by the arena, addressed by
/// [`PrimitiveId`], dropped in bulk on [`PrimitiveArena::clear`].
#[derive(Clone, Debug)]
pub struct RenderPrimitive {
    pub kind: PrimitiveKind,
    pub transform: Mat4,
    pub normal_matrix: Mat4,
    pub material: Handle<Material>,
    /// Lights affecting this primitive on the forward path; empty for
    /// deferred-only primitives.
    pub lights: ForwardLightList,
    pub skinned: bool,
}

impl RenderPrimitive {
    pub fn new(kind: PrimitiveKind, transform: Mat4, material: Handle<Material>) -> Self {
        let skinned = matches!(kind, PrimitiveKind::SkinnedMesh { .. });
        Self {
            kind,
            transform,
            normal_matrix: transform.inverse().transpose(),
            material,
            lights: ForwardLightList::default(),
            skinned,
        }
    }

    pub fn domain(&self) -> ShaderDomain {
        self.kind.domain()
    }
}

/// Per-frame primitive storage. Allocation appends, destruction is bulk;
/// there is no per-slot free.
#[derive(Default)]
pub struct PrimitiveArena {
    items: Vec<RenderPrimitive>,
}

impl PrimitiveArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, primitive: RenderPrimitive) -> PrimitiveId {
        let id = PrimitiveId(self.items.len() as u32);
        self.items.push(primitive);
        id
    }

    pub fn get(&self, id: PrimitiveId) -> &RenderPrimitive {
        &self.items[id.index()]
    }

    pub fn get_mut(&mut self, id: PrimitiveId) -> &mut RenderPrimitive {
        &mut self.items[id.index()]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PrimitiveId, &RenderPrimitive)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (PrimitiveId(index as u32), item))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn mesh_primitive(translation: Vec3) -> RenderPrimitive {
        RenderPrimitive::new(
            PrimitiveKind::Mesh {
                mesh: Handle::new(0),
            },
            Mat4::from_translation(translation),
            Handle::new(0),
        )
    }

    #[test]
    fn ids_are_dense_and_stable() {
        let mut arena = PrimitiveArena::new();
        let a = arena.alloc(mesh_primitive(Vec3::ZERO));
        let b = arena.alloc(mesh_primitive(Vec3::X));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(arena
            .get(b)
            .transform
            .w_axis
            .abs_diff_eq(Vec4::new(1.0, 0.0, 0.0, 1.0), 1e-6));
    }

    #[test]
    fn clear_resets_allocation() {
        let mut arena = PrimitiveArena::new();
        arena.alloc(mesh_primitive(Vec3::ZERO));
        arena.clear();
        assert!(arena.is_empty());
        let id = arena.alloc(mesh_primitive(Vec3::Y));
        assert_eq!(id.index(), 0);
    }

    #[test]
    fn skinned_flag_follows_variant() {
        let skinned = RenderPrimitive::new(
            PrimitiveKind::SkinnedMesh {
                mesh: Handle::new(0),
            },
            Mat4::IDENTITY,
            Handle::new(0),
        );
        assert!(skinned.skinned);
        assert_eq!(skinned.domain(), ShaderDomain::Skinned);
        assert!(!mesh_primitive(Vec3::ZERO).skinned);
    }
}
