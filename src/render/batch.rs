use std::cmp::Ordering;
use std::collections::HashMap;

use crate::asset::Handle;
use crate::render::material::{Material, MaterialShader, ShaderDomain};
use crate::render::primitive::PrimitiveId;

/// Primitives sharing one material, drawn under that material's shader.
#[derive(Debug)]
pub struct MaterialBatch {
    pub material: Handle<Material>,
    pub primitives: Vec<PrimitiveId>,
}

/// Material batches sharing one shader program. `materials` holds indices
/// into the owning batch's material-batch list.
#[derive(Debug)]
pub struct ShaderBatch {
    pub shader: Handle<MaterialShader>,
    pub materials: Vec<usize>,
}

/// Shader → material → primitive grouping for one opaque pass.
///
/// Membership is tracked with per-batch hash maps keyed by resource handle,
/// so two live batches can index the same shader or material without
/// cross-talk, and a stale entry cannot survive `reset()`. Consumers walk
/// shaders in first-seen order, bind each shader once, bind each material
/// under it once, then draw its primitives.
#[derive(Default)]
pub struct DeferredBatch {
    shader_batches: Vec<ShaderBatch>,
    material_batches: Vec<MaterialBatch>,
    primitives: Vec<PrimitiveId>,
    shader_lookup: HashMap<Handle<MaterialShader>, usize>,
    material_lookup: HashMap<Handle<Material>, usize>,
}

impl DeferredBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        id: PrimitiveId,
        material: Handle<Material>,
        shader: Handle<MaterialShader>,
    ) {
        let material_index = match self.material_lookup.get(&material) {
            Some(&index) => index,
            None => {
                let shader_index = match self.shader_lookup.get(&shader) {
                    Some(&index) => index,
                    None => {
                        let index = self.shader_batches.len();
                        self.shader_batches.push(ShaderBatch {
                            shader,
                            materials: Vec::new(),
                        });
                        self.shader_lookup.insert(shader, index);
                        index
                    }
                };
                let index = self.material_batches.len();
                self.material_batches.push(MaterialBatch {
                    material,
                    primitives: Vec::new(),
                });
                self.shader_batches[shader_index].materials.push(index);
                self.material_lookup.insert(material, index);
                index
            }
        };

        self.material_batches[material_index].primitives.push(id);
        self.primitives.push(id);
    }

    pub fn reset(&mut self) {
        self.shader_batches.clear();
        self.material_batches.clear();
        self.primitives.clear();
        self.shader_lookup.clear();
        self.material_lookup.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn shader_count(&self) -> usize {
        self.shader_batches.len()
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    pub fn shader_batches(&self) -> &[ShaderBatch] {
        &self.shader_batches
    }

    pub fn material_batch(&self, index: usize) -> &MaterialBatch {
        &self.material_batches[index]
    }

    pub fn primitives(&self) -> &[PrimitiveId] {
        &self.primitives
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TranslucentEntry {
    pub primitive: PrimitiveId,
    pub distance_squared: f32,
}

/// Alpha-blended primitives, ordered far-to-near before the forward pass.
/// No shader/material grouping: blend order wins over state-change savings.
#[derive(Default)]
pub struct TranslucentBatch {
    entries: Vec<TranslucentEntry>,
}

impl TranslucentBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, primitive: PrimitiveId, distance_squared: f32) {
        self.entries.push(TranslucentEntry {
            primitive,
            distance_squared,
        });
    }

    /// Descending distance; ties keep no particular order.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            b.distance_squared
                .partial_cmp(&a.distance_squared)
                .unwrap_or(Ordering::Equal)
        });
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[TranslucentEntry] {
        &self.entries
    }
}

/// Index of the pre-seeded default bucket for a shadow-caster domain.
fn default_bucket_index(domain: ShaderDomain) -> Option<usize> {
    match domain {
        ShaderDomain::Mesh => Some(0),
        ShaderDomain::Skinned => Some(1),
        ShaderDomain::Terrain => Some(2),
        ShaderDomain::MeshInstance | ShaderDomain::Custom => None,
    }
}

const DEFAULT_BUCKET_COUNT: usize = 3;

#[derive(Debug)]
pub struct ShadowBucket {
    pub shader: Option<Handle<MaterialShader>>,
    pub material: Option<Handle<Material>>,
    pub primitives: Vec<PrimitiveId>,
}

impl ShadowBucket {
    fn empty() -> Self {
        Self {
            shader: None,
            material: None,
            primitives: Vec::new(),
        }
    }
}

/// Grouping for one cascade's depth pass. The first three buckets are the
/// built-in depth-only shaders (Mesh, Skinned, Terrain); their shader and
/// material are filled in lazily on first draw and survive `reset()`.
/// Materials with a custom depth shader get a dynamic bucket per material,
/// rebuilt every frame.
pub struct ShadowBatch {
    buckets: Vec<ShadowBucket>,
    dynamic_lookup: HashMap<Handle<Material>, usize>,
}

impl ShadowBatch {
    pub fn new() -> Self {
        Self {
            buckets: (0..DEFAULT_BUCKET_COUNT)
                .map(|_| ShadowBucket::empty())
                .collect(),
            dynamic_lookup: HashMap::new(),
        }
    }

    /// Installs the built-in depth shader for one default bucket. Called by
    /// the pipeline the first time the bucket is drawn; the default material
    /// may not exist before the render module finishes init.
    pub fn set_default_shader(
        &mut self,
        domain: ShaderDomain,
        shader: Handle<MaterialShader>,
        material: Handle<Material>,
    ) {
        let Some(index) = default_bucket_index(domain) else {
            debug_assert!(false, "no default shadow bucket for {domain:?}");
            log::warn!("No default shadow bucket for domain {domain:?}");
            return;
        };
        self.buckets[index].shader = Some(shader);
        self.buckets[index].material = Some(material);
    }

    /// Routes a caster either to its material's custom depth shader bucket or
    /// to the built-in bucket for its domain. Foliage and custom domains have
    /// no built-in depth bucket; reaching the default path with one is a
    /// caller bug, checked in debug and skipped with a warning in release.
    pub fn add(
        &mut self,
        id: PrimitiveId,
        domain: ShaderDomain,
        material: Handle<Material>,
        custom_shadow: Option<Handle<MaterialShader>>,
        force_default: bool,
    ) {
        let custom = if force_default { None } else { custom_shadow };
        match custom {
            Some(shader) => {
                let index = match self.dynamic_lookup.get(&material) {
                    Some(&index) => index,
                    None => {
                        let index = self.buckets.len();
                        self.buckets.push(ShadowBucket {
                            shader: Some(shader),
                            material: Some(material),
                            primitives: Vec::new(),
                        });
                        self.dynamic_lookup.insert(material, index);
                        index
                    }
                };
                self.buckets[index].primitives.push(id);
            }
            None => {
                let Some(index) = default_bucket_index(domain) else {
                    debug_assert!(
                        false,
                        "shadow caster of domain {domain:?} without a custom depth shader"
                    );
                    log::warn!(
                        "Dropping shadow caster: domain {domain:?} has no default depth shader"
                    );
                    return;
                };
                self.buckets[index].primitives.push(id);
            }
        }
    }

    /// Clears this frame's primitives and dynamic buckets. The default
    /// buckets keep their shader/material across frames once set.
    pub fn reset(&mut self) {
        self.buckets.truncate(DEFAULT_BUCKET_COUNT);
        for bucket in &mut self.buckets {
            bucket.primitives.clear();
        }
        self.dynamic_lookup.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.primitives.is_empty())
    }

    pub fn primitive_count(&self) -> usize {
        self.buckets.iter().map(|b| b.primitives.len()).sum()
    }

    pub fn buckets(&self) -> &[ShadowBucket] {
        &self.buckets
    }

    pub fn default_bucket(&self, domain: ShaderDomain) -> Option<&ShadowBucket> {
        default_bucket_index(domain).map(|index| &self.buckets[index])
    }
}

impl Default for ShadowBatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> PrimitiveId {
        PrimitiveId::from_raw(index)
    }

    #[test]
    fn deferred_groups_by_shader_then_material() {
        let mut batch = DeferredBatch::new();
        let shader_a: Handle<MaterialShader> = Handle::new(0);
        let shader_b: Handle<MaterialShader> = Handle::new(1);
        let red: Handle<Material> = Handle::new(0);
        let green: Handle<Material> = Handle::new(1);
        let blue: Handle<Material> = Handle::new(2);

        batch.add(id(0), red, shader_a);
        batch.add(id(1), green, shader_a);
        batch.add(id(2), red, shader_a);
        batch.add(id(3), blue, shader_b);

        assert_eq!(batch.shader_count(), 2);
        assert_eq!(batch.primitive_count(), 4);

        let shaders = batch.shader_batches();
        assert_eq!(shaders[0].shader, shader_a);
        assert_eq!(shaders[0].materials.len(), 2);
        assert_eq!(shaders[1].shader, shader_b);
        assert_eq!(shaders[1].materials.len(), 1);

        let red_batch = batch.material_batch(shaders[0].materials[0]);
        assert_eq!(red_batch.material, red);
        assert_eq!(red_batch.primitives.len(), 2);
    }

    #[test]
    fn deferred_every_primitive_lands_in_exactly_one_material_batch() {
        let mut batch = DeferredBatch::new();
        for i in 0..12u32 {
            batch.add(
                id(i),
                Handle::new(i % 3),
                Handle::new(i % 2),
            );
        }

        let mut seen = std::collections::HashSet::new();
        for shader_batch in batch.shader_batches() {
            for &material_index in &shader_batch.materials {
                for prim in &batch.material_batch(material_index).primitives {
                    assert!(seen.insert(*prim), "primitive in two material batches");
                }
            }
        }
        assert_eq!(seen.len(), batch.primitive_count());
    }

    #[test]
    fn deferred_reset_is_idempotent_and_unaliased() {
        let mut batch = DeferredBatch::new();
        let shader: Handle<MaterialShader> = Handle::new(7);
        let material: Handle<Material> = Handle::new(7);
        batch.add(id(0), material, shader);

        batch.reset();
        batch.reset();
        assert!(batch.is_empty());
        assert_eq!(batch.shader_count(), 0);

        // Re-adding the same resources builds fresh groups, not stale slots.
        batch.add(id(1), material, shader);
        assert_eq!(batch.shader_count(), 1);
        assert_eq!(batch.material_batch(0).primitives, vec![id(1)]);
    }

    #[test]
    fn translucent_sorts_far_to_near() {
        let mut batch = TranslucentBatch::new();
        batch.add(id(0), 25.0);
        batch.add(id(1), 100.0);
        batch.add(id(2), 4.0);
        batch.sort();

        let order: Vec<f32> = batch
            .entries()
            .iter()
            .map(|e| e.distance_squared)
            .collect();
        assert_eq!(order, vec![100.0, 25.0, 4.0]);
        for pair in batch.entries().windows(2) {
            assert!(pair[0].distance_squared >= pair[1].distance_squared);
        }
    }

    #[test]
    fn shadow_default_buckets_route_by_domain() {
        let mut batch = ShadowBatch::new();
        batch.add(id(0), ShaderDomain::Mesh, Handle::new(0), None, false);
        batch.add(id(1), ShaderDomain::Skinned, Handle::new(1), None, false);
        batch.add(id(2), ShaderDomain::Terrain, Handle::new(2), None, false);

        assert_eq!(batch.buckets()[0].primitives, vec![id(0)]);
        assert_eq!(batch.buckets()[1].primitives, vec![id(1)]);
        assert_eq!(batch.buckets()[2].primitives, vec![id(2)]);
    }

    #[test]
    fn shadow_custom_shader_gets_dynamic_bucket() {
        let mut batch = ShadowBatch::new();
        let material: Handle<Material> = Handle::new(4);
        let depth_shader: Handle<MaterialShader> = Handle::new(9);

        batch.add(id(0), ShaderDomain::Mesh, material, Some(depth_shader), false);
        batch.add(id(1), ShaderDomain::Mesh, material, Some(depth_shader), false);
        // Forcing the default ignores the custom shader.
        batch.add(id(2), ShaderDomain::Mesh, material, Some(depth_shader), true);

        assert_eq!(batch.buckets().len(), DEFAULT_BUCKET_COUNT + 1);
        assert_eq!(batch.buckets()[3].shader, Some(depth_shader));
        assert_eq!(batch.buckets()[3].primitives.len(), 2);
        assert_eq!(batch.buckets()[0].primitives, vec![id(2)]);
    }

    #[test]
    fn shadow_reset_keeps_default_shaders_drops_dynamic() {
        let mut batch = ShadowBatch::new();
        let shader: Handle<MaterialShader> = Handle::new(1);
        let material: Handle<Material> = Handle::new(1);
        batch.set_default_shader(ShaderDomain::Mesh, shader, material);
        batch.add(id(0), ShaderDomain::Mesh, material, None, false);
        batch.add(id(1), ShaderDomain::Mesh, Handle::new(2), Some(Handle::new(3)), false);

        batch.reset();

        assert!(batch.is_empty());
        assert_eq!(batch.buckets().len(), DEFAULT_BUCKET_COUNT);
        assert_eq!(batch.buckets()[0].shader, Some(shader));
        assert_eq!(batch.buckets()[0].material, Some(material));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic)]
    fn shadow_default_path_rejects_foliage_domain() {
        let mut batch = ShadowBatch::new();
        batch.add(id(0), ShaderDomain::MeshInstance, Handle::new(0), None, false);
        // Release builds skip the caster instead of panicking.
        assert!(batch.is_empty());
    }
}
