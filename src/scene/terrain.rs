use glam::Mat4;

use crate::asset::{Handle, Mesh};
use crate::math::BoundingSphere;
use crate::render::material::Material;

/// Terrain as consumed by the renderer: pre-built spatial bins with baked
/// meshes, plus instanced foliage layers referencing those bins. Generation
/// and streaming live outside this crate.
pub struct Terrain {
    pub material: Handle<Material>,
    pub bins: Vec<TerrainBin>,
    pub foliage: Vec<FoliageLayer>,
    /// Optional clamp on how far terrain casts directional shadows.
    pub shadow_distance: Option<f32>,
}

pub struct TerrainBin {
    pub mesh: Handle<Mesh>,
    pub bounds: BoundingSphere,
}

pub struct FoliageLayer {
    pub mesh: Handle<Mesh>,
    pub material: Handle<Material>,
    /// Per-layer draw distance for instances, independent of bin culling.
    pub clip_distance: f32,
    pub cast_shadow: bool,
    pub instances: Vec<FoliageInstance>,
}

#[derive(Clone, Copy, Debug)]
pub struct FoliageInstance {
    pub transform: Mat4,
    /// Index of the terrain bin this instance belongs to; instances are only
    /// gathered for bins that survived culling this frame.
    pub bin: u32,
}

impl Terrain {
    pub fn new(material: Handle<Material>) -> Self {
        Self {
            material,
            bins: Vec::new(),
            foliage: Vec::new(),
            shadow_distance: None,
        }
    }
}
