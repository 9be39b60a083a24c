//! Grouping invariants of the frame batches: every primitive lands in
//! exactly one material batch under exactly one shader batch, resets leave
//! no stale state behind, and the translucent batch orders far to near.

use std::collections::HashSet;

use ember_renderer::asset::Handle;
use ember_renderer::render::batch::{DeferredBatch, ShadowBatch, TranslucentBatch};
use ember_renderer::render::material::{Material, MaterialShader, ShaderDomain};
use ember_renderer::render::primitive::{PrimitiveArena, PrimitiveKind, RenderPrimitive};
use glam::Mat4;

fn ids(count: u32) -> Vec<ember_renderer::render::primitive::PrimitiveId> {
    let mut arena = PrimitiveArena::new();
    (0..count)
        .map(|_| {
            arena.alloc(RenderPrimitive::new(
                PrimitiveKind::Mesh {
                    mesh: Handle::new(0),
                },
                Mat4::IDENTITY,
                Handle::new(0),
            ))
        })
        .collect()
}

#[test]
fn every_primitive_is_reachable_exactly_once() {
    let mut batch = DeferredBatch::new();
    let ids = ids(24);

    // Interleave 4 materials across 3 shaders.
    for (i, &id) in ids.iter().enumerate() {
        let material: Handle<Material> = Handle::new((i % 4) as u32);
        let shader: Handle<MaterialShader> = Handle::new((i % 4 % 3) as u32);
        batch.add(id, material, shader);
    }

    let mut seen = HashSet::new();
    for shader_batch in batch.shader_batches() {
        for &material_index in &shader_batch.materials {
            let material_batch = batch.material_batch(material_index);
            for &id in &material_batch.primitives {
                assert!(seen.insert(id), "{id:?} reachable through two groups");
            }
        }
    }

    assert_eq!(seen.len(), ids.len());
    assert_eq!(batch.primitive_count(), ids.len());
}

#[test]
fn a_shader_and_material_appear_at_most_once() {
    let mut batch = DeferredBatch::new();
    let ids = ids(16);
    let shader: Handle<MaterialShader> = Handle::new(7);
    let material: Handle<Material> = Handle::new(7);

    for &id in &ids {
        batch.add(id, material, shader);
    }

    assert_eq!(batch.shader_count(), 1);
    assert_eq!(batch.shader_batches()[0].materials.len(), 1);
    assert_eq!(batch.material_batch(0).primitives.len(), ids.len());
}

#[test]
fn reset_twice_equals_reset_once() {
    let mut batch = DeferredBatch::new();
    let ids = ids(4);
    for &id in &ids {
        batch.add(id, Handle::new(0), Handle::new(0));
    }

    batch.reset();
    let empty_after_one = (batch.shader_count(), batch.primitive_count());
    batch.reset();
    assert_eq!(
        (batch.shader_count(), batch.primitive_count()),
        empty_after_one
    );
    assert!(batch.is_empty());
}

#[test]
fn reuse_after_reset_gets_fresh_indices() {
    let mut batch = DeferredBatch::new();
    let ids = ids(3);
    let shader: Handle<MaterialShader> = Handle::new(2);
    let material: Handle<Material> = Handle::new(5);

    batch.add(ids[0], material, shader);
    batch.add(ids[1], material, shader);
    batch.reset();

    // The same resources must build a brand new group, not alias the old
    // slot.
    batch.add(ids[2], material, shader);
    assert_eq!(batch.shader_count(), 1);
    assert_eq!(batch.material_batch(0).primitives, vec![ids[2]]);
}

#[test]
fn translucent_iterates_farthest_first() {
    let mut batch = TranslucentBatch::new();
    let ids = ids(2);

    // Two primitives at view distances 5 and 10.
    batch.add(ids[0], 25.0);
    batch.add(ids[1], 100.0);
    batch.sort();

    let order: Vec<_> = batch.entries().iter().map(|e| e.primitive).collect();
    assert_eq!(order, vec![ids[1], ids[0]]);

    for pair in batch.entries().windows(2) {
        assert!(pair[0].distance_squared >= pair[1].distance_squared);
    }
}

#[test]
fn translucent_sort_is_total_over_many_entries() {
    let mut batch = TranslucentBatch::new();
    let ids = ids(32);
    for (i, &id) in ids.iter().enumerate() {
        // Scrambled distances.
        let d = ((i * 37) % 32) as f32;
        batch.add(id, d * d);
    }
    batch.sort();
    for pair in batch.entries().windows(2) {
        assert!(pair[0].distance_squared >= pair[1].distance_squared);
    }
}

#[test]
fn shadow_batch_keeps_default_shaders_across_frames() {
    let mut batch = ShadowBatch::new();
    let ids = ids(2);
    let shader: Handle<MaterialShader> = Handle::new(3);
    let material: Handle<Material> = Handle::new(3);

    batch.set_default_shader(ShaderDomain::Skinned, shader, material);
    batch.add(ids[0], ShaderDomain::Skinned, material, None, false);
    batch.reset();
    batch.add(ids[1], ShaderDomain::Skinned, material, None, false);

    let bucket = batch.default_bucket(ShaderDomain::Skinned).unwrap();
    assert_eq!(bucket.shader, Some(shader));
    assert_eq!(bucket.primitives, vec![ids[1]]);
}

#[test]
fn shadow_dynamic_buckets_are_rebuilt_per_frame() {
    let mut batch = ShadowBatch::new();
    let ids = ids(2);
    let material: Handle<Material> = Handle::new(9);
    let depth_shader: Handle<MaterialShader> = Handle::new(4);

    batch.add(ids[0], ShaderDomain::Mesh, material, Some(depth_shader), false);
    assert_eq!(batch.buckets().len(), 4);

    batch.reset();
    assert_eq!(batch.buckets().len(), 3);

    batch.add(ids[1], ShaderDomain::Mesh, material, Some(depth_shader), false);
    assert_eq!(batch.buckets().len(), 4);
    assert_eq!(batch.buckets()[3].primitives, vec![ids[1]]);
}

#[test]
fn force_default_overrides_custom_depth_shader() {
    let mut batch = ShadowBatch::new();
    let ids = ids(1);
    let material: Handle<Material> = Handle::new(1);
    let depth_shader: Handle<MaterialShader> = Handle::new(2);

    batch.add(ids[0], ShaderDomain::Terrain, material, Some(depth_shader), true);

    assert_eq!(batch.buckets().len(), 3);
    let bucket = batch.default_bucket(ShaderDomain::Terrain).unwrap();
    assert_eq!(bucket.primitives, vec![ids[0]]);
}

#[test]
fn material_construction_supports_custom_depth_shader() {
    let shader: Handle<MaterialShader> = Handle::new(0);
    let depth: Handle<MaterialShader> = Handle::new(1);
    let material = Material::new(
        "foliage",
        shader,
        ShaderDomain::MeshInstance,
        ember_renderer::render::material::MaterialKind::MaskedFoliage,
    )
    .with_shadow_shader(depth);
    assert_eq!(material.shadow_shader(), Some(depth));
}
