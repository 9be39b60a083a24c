// Plain hecs components consumed by the frame renderer once per frame.

use glam::Vec3;

use crate::asset::{Handle, Mesh};
use crate::render::material::Material;
use crate::render::primitive::{PrimitiveKind, RenderPrimitive};
use crate::scene::Transform;

/// Local transform (position, rotation, scale).
#[derive(Debug, Clone, Copy)]
pub struct TransformComponent(pub Transform);

/// World-space transform, computed from the hierarchy by the scene layer.
#[derive(Debug, Clone, Copy)]
pub struct WorldTransform(pub Transform);

#[derive(Debug, Clone, Copy)]
pub struct MeshComponent(pub Handle<Mesh>);

#[derive(Debug, Clone, Copy)]
pub struct SkinnedMeshComponent(pub Handle<Mesh>);

#[derive(Debug, Clone, Copy)]
pub struct MaterialComponent(pub Handle<Material>);

#[derive(Debug, Clone, Copy)]
pub struct Visible(pub bool);

impl Default for Visible {
    fn default() -> Self {
        Self(true)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CastShadow(pub bool);

impl Default for CastShadow {
    fn default() -> Self {
        Self(true)
    }
}

/// Hard distance cutoff in world units; 0 disables the cutoff. An object past
/// its clip distance is skipped entirely, shadows included.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipDistance(pub f32);

/// Name component for debugging.
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl MeshComponent {
    /// Emits this entity's draw units. One mesh component produces one
    /// primitive, but the collector shape leaves room for multi-part
    /// components.
    pub fn collect_primitives(
        &self,
        world: &Transform,
        material: Handle<Material>,
        mut collector: impl FnMut(RenderPrimitive),
    ) {
        collector(RenderPrimitive::new(
            PrimitiveKind::Mesh { mesh: self.0 },
            world.matrix(),
            material,
        ));
    }
}

impl SkinnedMeshComponent {
    pub fn collect_primitives(
        &self,
        world: &Transform,
        material: Handle<Material>,
        mut collector: impl FnMut(RenderPrimitive),
    ) {
        collector(RenderPrimitive::new(
            PrimitiveKind::SkinnedMesh { mesh: self.0 },
            world.matrix(),
            material,
        ));
    }
}

// ============================================================================
// Lighting components
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    /// 0 = always considered, otherwise culled past this distance.
    pub clip_distance: f32,
}

/// Extra directional light besides the scene sun; never culled.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Spot light; direction comes from the entity transform's forward axis.
#[derive(Debug, Clone, Copy)]
pub struct SpotLight {
    pub color: Vec3,
    pub intensity: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub range: f32,
    pub clip_distance: f32,
}
