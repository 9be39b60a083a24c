//! End-to-end snapshot building: an ECS scene goes in, culled and classified
//! batches come out. No GPU device is involved; everything here runs on the
//! CPU side of the renderer.

use ember_renderer::asset::{cube_mesh, Assets, Handle};
use ember_renderer::render::material::{Material, MaterialKind, MaterialShader, ShaderDomain};
use ember_renderer::render::RenderScene;
use ember_renderer::scene::components::{
    CastShadow, ClipDistance, MaterialComponent, MeshComponent, PointLight, SkinnedMeshComponent,
    SpotLight, WorldTransform,
};
use ember_renderer::scene::{
    Camera, FoliageInstance, FoliageLayer, Scene, Terrain, TerrainBin, Transform,
};
use ember_renderer::settings::RenderSettings;
use ember_renderer::math::BoundingSphere;
use glam::{Mat4, Quat, Vec3, Vec4};

struct Fixture {
    assets: Assets,
    mesh: Handle<ember_renderer::asset::Mesh>,
    opaque: Handle<Material>,
    translucent: Handle<Material>,
}

fn fixture() -> Fixture {
    let mut assets = Assets::new();
    let mesh = assets.meshes.insert(cube_mesh());

    let shader = assets
        .shaders
        .insert(MaterialShader::new("pbr", ShaderDomain::Mesh));
    let opaque = assets.materials.insert(Material::new(
        "opaque",
        shader,
        ShaderDomain::Mesh,
        MaterialKind::Opaque,
    ));
    let translucent = assets.materials.insert(
        Material::new("glass", shader, ShaderDomain::Mesh, MaterialKind::Translucent)
            .with_base_color([1.0, 1.0, 1.0, 0.4]),
    );

    Fixture {
        assets,
        mesh,
        opaque,
        translucent,
    }
}

fn camera_scene() -> Scene {
    let mut scene = Scene::new();
    scene.camera = Some(Camera {
        eye: Vec3::new(0.0, 0.0, 5.0),
        target: Vec3::ZERO,
        up: Vec3::Y,
        fov_y_radians: 60f32.to_radians(),
        near: 0.1,
        far: 1000.0,
    });
    scene
}

fn render_scene() -> RenderScene {
    let mut rs = RenderScene::new(&RenderSettings::default());
    rs.set_aspect(16.0 / 9.0);
    rs
}

fn at(position: Vec3) -> WorldTransform {
    WorldTransform(Transform::from_translation(position))
}

#[test]
fn empty_scene_builds_to_empty_batches() {
    let fx = fixture();
    let scene = camera_scene();
    let mut rs = render_scene();

    rs.build(&scene, &fx.assets);

    assert!(rs.deferred().is_empty());
    assert!(rs.translucent().is_empty());
    assert!(rs.lights().is_empty());
    assert!(rs.primitives().is_empty());
    assert!(rs.cascades().cascades().iter().all(|c| c.batch.is_empty()));
}

#[test]
fn single_visible_mesh_fills_one_shader_and_material_batch() {
    let fx = fixture();
    let mut scene = camera_scene();
    scene.sun.enabled = false;
    scene.world.spawn((
        MeshComponent(fx.mesh),
        MaterialComponent(fx.opaque),
        at(Vec3::ZERO),
    ));

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert_eq!(rs.deferred().shader_count(), 1);
    let shader_batch = &rs.deferred().shader_batches()[0];
    assert_eq!(shader_batch.materials.len(), 1);
    let material_batch = rs.deferred().material_batch(shader_batch.materials[0]);
    assert_eq!(material_batch.primitives.len(), 1);
    assert_eq!(material_batch.material, fx.opaque);

    // Sun disabled: no shadow work at all.
    assert!(rs.cascades().cascades().iter().all(|c| c.batch.is_empty()));
}

#[test]
fn offscreen_shadow_caster_lands_only_in_the_cascades() {
    let fx = fixture();
    let mut scene = camera_scene();
    scene.sun.enabled = true;
    scene.sun.direction = Vec3::NEG_Y;

    // High above the camera frustum: invisible, but inside the first
    // cascade's light volume (the sun shines straight down).
    scene.world.spawn((
        MeshComponent(fx.mesh),
        MaterialComponent(fx.opaque),
        at(Vec3::new(0.0, 20.0, -2.0)),
    ));

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert!(rs.deferred().is_empty());
    assert_eq!(rs.cascades().cascades()[0].batch.primitive_count(), 1);
}

#[test]
fn visible_caster_is_drawn_and_shadowed() {
    let fx = fixture();
    let mut scene = camera_scene();
    scene.sun.enabled = true;

    scene.world.spawn((
        MeshComponent(fx.mesh),
        MaterialComponent(fx.opaque),
        at(Vec3::ZERO),
    ));

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert_eq!(rs.deferred().primitive_count(), 1);
    let in_shadow: usize = rs
        .cascades()
        .cascades()
        .iter()
        .map(|c| c.batch.primitive_count())
        .sum();
    assert!(in_shadow >= 1, "visible caster must also reach the cascades");
}

#[test]
fn cast_shadow_false_keeps_object_out_of_cascades() {
    let fx = fixture();
    let mut scene = camera_scene();
    scene.sun.enabled = true;

    scene.world.spawn((
        MeshComponent(fx.mesh),
        MaterialComponent(fx.opaque),
        at(Vec3::ZERO),
        CastShadow(false),
    ));

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert_eq!(rs.deferred().primitive_count(), 1);
    assert!(rs.cascades().cascades().iter().all(|c| c.batch.is_empty()));
}

#[test]
fn clip_distance_cutoff_excludes_view_and_shadows() {
    let fx = fixture();
    let mut scene = camera_scene();
    scene.sun.enabled = true;

    // In the middle of the view, but past its own clip distance.
    scene.world.spawn((
        MeshComponent(fx.mesh),
        MaterialComponent(fx.opaque),
        at(Vec3::new(0.0, 0.0, -20.0)),
        ClipDistance(5.0),
    ));

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert!(rs.deferred().is_empty());
    assert!(rs.cascades().cascades().iter().all(|c| c.batch.is_empty()));
    assert_eq!(rs.stats().culled, 1);
}

#[test]
fn translucent_primitives_sort_far_to_near() {
    let fx = fixture();
    let mut scene = camera_scene();

    let near = Vec3::new(0.0, 0.0, 0.0); // 5 from the camera
    let far = Vec3::new(0.0, 0.0, -5.0); // 10 from the camera
    scene.world.spawn((
        MeshComponent(fx.mesh),
        MaterialComponent(fx.translucent),
        at(near),
    ));
    scene.world.spawn((
        MeshComponent(fx.mesh),
        MaterialComponent(fx.translucent),
        at(far),
    ));

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert!(rs.deferred().is_empty());
    assert_eq!(rs.translucent().len(), 2);

    let entries = rs.translucent().entries();
    assert!(entries[0].distance_squared > entries[1].distance_squared);
    let first = rs.primitives().get(entries[0].primitive);
    // Farthest first.
    assert!(first.transform.w_axis.truncate().abs_diff_eq(far, 1e-5));
}

#[test]
fn skinned_primitive_with_mesh_material_gets_the_default_substitute() {
    let fx = fixture();
    let mut scene = camera_scene();

    // Domain mismatch: a static-mesh material on a skinned primitive.
    scene.world.spawn((
        SkinnedMeshComponent(fx.mesh),
        MaterialComponent(fx.opaque),
        at(Vec3::ZERO),
    ));

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert_eq!(rs.deferred().primitive_count(), 1);
    let shader_batch = &rs.deferred().shader_batches()[0];
    let material_batch = rs.deferred().material_batch(shader_batch.materials[0]);
    assert_eq!(
        material_batch.material,
        fx.assets.default_material(ShaderDomain::Skinned)
    );
    assert_eq!(
        shader_batch.shader,
        fx.assets.default_shader(ShaderDomain::Skinned)
    );
}

#[test]
fn translucent_primitive_gathers_nearby_lights_only() {
    let fx = fixture();
    let mut scene = camera_scene();

    scene.world.spawn((
        MeshComponent(fx.mesh),
        MaterialComponent(fx.translucent),
        at(Vec3::ZERO),
    ));
    // In range.
    scene.world.spawn((
        PointLight {
            color: Vec3::ONE,
            intensity: 10.0,
            range: 5.0,
            clip_distance: 0.0,
        },
        at(Vec3::new(2.0, 0.0, 0.0)),
    ));
    // Visible but too far from the primitive to affect it.
    scene.world.spawn((
        PointLight {
            color: Vec3::ONE,
            intensity: 10.0,
            range: 3.0,
            clip_distance: 0.0,
        },
        at(Vec3::new(0.0, 10.0, -40.0)),
    ));

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert_eq!(rs.translucent().len(), 1);
    let primitive = rs.primitives().get(rs.translucent().entries()[0].primitive);
    assert_eq!(primitive.lights.len(), 1);
}

#[test]
fn point_light_culling_by_frustum_and_clip_distance() {
    let fx = fixture();
    let mut scene = camera_scene();

    // Inside the view.
    scene.world.spawn((
        PointLight {
            color: Vec3::ONE,
            intensity: 1.0,
            range: 4.0,
            clip_distance: 0.0,
        },
        at(Vec3::new(0.0, 0.0, -10.0)),
    ));
    // Behind the camera, radius nowhere near the frustum.
    scene.world.spawn((
        PointLight {
            color: Vec3::ONE,
            intensity: 1.0,
            range: 1.0,
            clip_distance: 0.0,
        },
        at(Vec3::new(0.0, 0.0, 50.0)),
    ));
    // In view but past its clip distance.
    scene.world.spawn((
        PointLight {
            color: Vec3::ONE,
            intensity: 1.0,
            range: 4.0,
            clip_distance: 10.0,
        },
        at(Vec3::new(0.0, 0.0, -40.0)),
    ));
    // Spot light aimed down the view axis, in range.
    scene.world.spawn((
        SpotLight {
            color: Vec3::ONE,
            intensity: 2.0,
            inner_angle: 0.3,
            outer_angle: 0.6,
            range: 20.0,
            clip_distance: 0.0,
        },
        WorldTransform(Transform::from_trs(
            Vec3::new(0.0, 3.0, -5.0),
            Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
            Vec3::ONE,
        )),
    ));

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert_eq!(rs.lights().len(), 2);
}

#[test]
fn terrain_bins_cull_independently_and_gather_foliage() {
    let mut fx = fixture();
    let mut scene = camera_scene();

    let terrain_shader = fx
        .assets
        .shaders
        .insert(MaterialShader::new("terrain", ShaderDomain::Terrain));
    let terrain_material = fx.assets.materials.insert(Material::new(
        "terrain",
        terrain_shader,
        ShaderDomain::Terrain,
        MaterialKind::Opaque,
    ));
    let foliage_shader = fx
        .assets
        .shaders
        .insert(MaterialShader::new("foliage", ShaderDomain::MeshInstance));
    let foliage_material = fx.assets.materials.insert(Material::new(
        "foliage",
        foliage_shader,
        ShaderDomain::MeshInstance,
        MaterialKind::MaskedFoliage,
    ));

    let mut terrain = Terrain::new(terrain_material);
    // Bin 0 in front of the camera, bin 1 far off to the side.
    terrain.bins.push(TerrainBin {
        mesh: fx.mesh,
        bounds: BoundingSphere::new(Vec3::new(0.0, 0.0, -5.0), 4.0),
    });
    terrain.bins.push(TerrainBin {
        mesh: fx.mesh,
        bounds: BoundingSphere::new(Vec3::new(2000.0, 0.0, 0.0), 4.0),
    });
    terrain.foliage.push(FoliageLayer {
        mesh: fx.mesh,
        material: foliage_material,
        clip_distance: 100.0,
        cast_shadow: false,
        instances: vec![
            FoliageInstance {
                transform: Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)),
                bin: 0,
            },
            FoliageInstance {
                transform: Mat4::from_translation(Vec3::new(1.0, 0.0, -5.0)),
                bin: 0,
            },
            FoliageInstance {
                transform: Mat4::from_translation(Vec3::new(2000.0, 0.0, 0.0)),
                bin: 1,
            },
        ],
    });
    scene.terrain = Some(terrain);

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    // One terrain bin drawn, one foliage primitive holding only that bin's
    // instances.
    assert_eq!(rs.stats().terrain_bins_drawn, 1);
    assert_eq!(rs.stats().foliage_instances, 2);
    // Terrain bin + foliage layer in the deferred batch.
    assert_eq!(rs.deferred().primitive_count(), 2);
}

#[test]
fn terrain_shadow_distance_clamps_the_cascades() {
    let mut fx = fixture();
    let mut scene = camera_scene();
    scene.sun.enabled = true;

    let terrain_shader = fx
        .assets
        .shaders
        .insert(MaterialShader::new("terrain", ShaderDomain::Terrain));
    let terrain_material = fx.assets.materials.insert(Material::new(
        "terrain",
        terrain_shader,
        ShaderDomain::Terrain,
        MaterialKind::Opaque,
    ));
    let mut terrain = Terrain::new(terrain_material);
    terrain.shadow_distance = Some(40.0);
    scene.terrain = Some(terrain);

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);

    assert!((rs.cascades().max_distance() - 40.0).abs() < 1e-4);
}

#[test]
fn environment_resets_between_builds() {
    let fx = fixture();
    let mut scene = camera_scene();
    scene.sun.enabled = true;
    scene.sky_enabled = true;
    scene.sun.power = 7.0;

    let mut rs = render_scene();
    rs.build(&scene, &fx.assets);
    assert!(rs.environment().sun_enabled);
    assert!(rs.environment().sky_enabled);
    assert_eq!(rs.environment().sun_power, 7.0);

    scene.sun.enabled = false;
    scene.sky_enabled = false;
    rs.build(&scene, &fx.assets);
    assert!(!rs.environment().sun_enabled);
    assert!(!rs.environment().sky_enabled);
}

#[test]
fn explicit_view_is_used_when_the_scene_has_no_camera() {
    let fx = fixture();
    let mut scene = camera_scene();
    scene.camera = None;
    scene.world.spawn((
        MeshComponent(fx.mesh),
        MaterialComponent(fx.opaque),
        at(Vec3::new(0.0, 0.0, -5.0)),
    ));

    let mut rs = render_scene();
    rs.set_view(Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y));
    rs.set_projection(Mat4::perspective_rh(
        60f32.to_radians(),
        16.0 / 9.0,
        0.1,
        1000.0,
    ));
    rs.build(&scene, &fx.assets);

    assert!(rs.view().position.abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-4));
    assert_eq!(rs.deferred().primitive_count(), 1);
}

#[test]
fn debug_boxes_join_the_frame_and_clear_with_it() {
    let fx = fixture();
    let scene = camera_scene();
    let mut rs = render_scene();

    rs.build(&scene, &fx.assets);
    rs.push_debug_box(Vec3::ZERO, Vec3::ONE, Vec4::new(1.0, 0.0, 0.0, 0.5), &fx.assets);
    assert_eq!(rs.debug_primitives().len(), 1);
    assert_eq!(rs.primitives().len(), 1);

    // Next frame: rebuilt from scratch.
    rs.build(&scene, &fx.assets);
    assert!(rs.debug_primitives().is_empty());
    assert!(rs.primitives().is_empty());
}
