use glam::{Mat4, Vec3, Vec4};
use rayon::prelude::*;

use crate::asset::{Assets, Handle, Mesh};
use crate::math::{BoundingSphere, Frustum};
use crate::render::batch::{DeferredBatch, TranslucentBatch};
use crate::render::cascade::{CascadeMask, ShadowCascades};
use crate::render::light::{ForwardLightList, LightKind, RenderLight};
use crate::render::material::{Material, ShaderDomain};
use crate::render::primitive::{PrimitiveArena, PrimitiveId, PrimitiveKind, RenderPrimitive};
use crate::scene::components::{
    CastShadow, ClipDistance, DirectionalLight, MaterialComponent, MeshComponent, PointLight,
    SkinnedMeshComponent, SpotLight, Visible, WorldTransform,
};
use crate::scene::{Scene, Transform};
use crate::settings::RenderSettings;

/// Camera state derived once per frame.
#[derive(Clone, Copy, Debug)]
pub struct SceneView {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub view_inverse: Mat4,
    pub inv_view_proj: Mat4,
    pub position: Vec3,
    pub direction: Vec3,
    pub frustum: Frustum,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for SceneView {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            view_inverse: Mat4::IDENTITY,
            inv_view_proj: Mat4::IDENTITY,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            frustum: Frustum::default(),
            fov_y: 60f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Per-frame global lighting state, reset to defaults on every clear.
#[derive(Clone, Copy, Debug)]
pub struct SceneEnvironment {
    pub sun_enabled: bool,
    pub sun_direction: Vec3,
    pub sun_color: Vec3,
    pub sun_power: f32,
    pub sky_enabled: bool,
}

impl Default for SceneEnvironment {
    fn default() -> Self {
        Self {
            sun_enabled: false,
            sun_direction: Vec3::NEG_Y,
            sun_color: Vec3::ONE,
            sun_power: 0.0,
            sky_enabled: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
    pub traversed: u32,
    pub culled: u32,
    pub deferred_primitives: u32,
    pub translucent_primitives: u32,
    pub shadow_casters: u32,
    pub lights: u32,
    pub terrain_bins_drawn: u32,
    pub foliage_instances: u32,
}

/// One frame's renderable snapshot: culled primitives classified into the
/// deferred/translucent/shadow batches, surviving lights, and the global
/// lighting environment. Exclusively owned by its render module; batches key
/// shader/material handles per frame, so one `RenderScene` must never be
/// built from two places at once.
pub struct RenderScene {
    view: SceneView,
    environment: SceneEnvironment,
    primitives: PrimitiveArena,
    lights: Vec<RenderLight>,
    deferred: DeferredBatch,
    translucent: TranslucentBatch,
    cascades: ShadowCascades,
    debug_primitives: Vec<PrimitiveId>,
    explicit_view: Mat4,
    explicit_proj: Mat4,
    aspect: f32,
    stats: FrameStats,
}

impl RenderScene {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            view: SceneView::default(),
            environment: SceneEnvironment::default(),
            primitives: PrimitiveArena::new(),
            lights: Vec::new(),
            deferred: DeferredBatch::new(),
            translucent: TranslucentBatch::new(),
            cascades: ShadowCascades::new(settings.cascades, settings.shadow_map_size),
            debug_primitives: Vec::new(),
            explicit_view: Mat4::IDENTITY,
            explicit_proj: Mat4::IDENTITY,
            aspect: 16.0 / 9.0,
            stats: FrameStats::default(),
        }
    }

    /// Fallback view matrix used when the scene has no camera (debug capture
    /// renders set these explicitly).
    pub fn set_view(&mut self, view: Mat4) {
        self.explicit_view = view;
    }

    pub fn set_projection(&mut self, proj: Mat4) {
        self.explicit_proj = proj;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn view(&self) -> &SceneView {
        &self.view
    }

    pub fn environment(&self) -> &SceneEnvironment {
        &self.environment
    }

    pub fn primitives(&self) -> &PrimitiveArena {
        &self.primitives
    }

    pub fn lights(&self) -> &[RenderLight] {
        &self.lights
    }

    pub fn deferred(&self) -> &DeferredBatch {
        &self.deferred
    }

    pub fn translucent(&self) -> &TranslucentBatch {
        &self.translucent
    }

    pub fn cascades(&self) -> &ShadowCascades {
        &self.cascades
    }

    pub fn cascades_mut(&mut self) -> &mut ShadowCascades {
        &mut self.cascades
    }

    pub fn debug_primitives(&self) -> &[PrimitiveId] {
        &self.debug_primitives
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Drops the previous frame wholesale: arena, lights, batches, cascade
    /// batches, and the lighting environment.
    pub fn clear(&mut self) {
        self.primitives.clear();
        self.lights.clear();
        self.deferred.reset();
        self.translucent.reset();
        self.cascades.reset();
        self.debug_primitives.clear();
        self.environment = SceneEnvironment::default();
        self.stats = FrameStats::default();
    }

    /// Builds this frame's snapshot from the external scene graph.
    pub fn build(&mut self, scene: &Scene, assets: &Assets) {
        self.clear();
        self.collect_view(scene);
        self.collect_lights(scene);
        self.collect_terrain(scene, assets);
        self.traverse(scene, assets);
        self.translucent.sort();
        self.stats.lights = self.lights.len() as u32;
    }

    /// Queues one debug box for this frame; drawn unlit in the forward pass.
    pub fn push_debug_box(&mut self, position: Vec3, scale: Vec3, color: Vec4, assets: &Assets) {
        let material = assets.default_material(ShaderDomain::Mesh);
        let id = self.primitives.alloc(RenderPrimitive::new(
            PrimitiveKind::DebugShape { color },
            Mat4::from_scale_rotation_translation(scale, glam::Quat::IDENTITY, position),
            material,
        ));
        self.debug_primitives.push(id);
    }

    fn collect_view(&mut self, scene: &Scene) {
        let (view, proj, fov_y, near, far) = match &scene.camera {
            Some(camera) => (
                camera.view(),
                camera.proj(self.aspect),
                camera.fov_y_radians,
                camera.near,
                camera.far,
            ),
            // No camera: keep the last explicitly set matrices and the
            // default perspective parameters.
            None => (
                self.explicit_view,
                self.explicit_proj,
                self.view.fov_y,
                self.view.near,
                self.view.far,
            ),
        };

        let view_inverse = view.inverse();
        let view_proj = proj * view;
        self.view = SceneView {
            view,
            proj,
            view_proj,
            view_inverse,
            inv_view_proj: view_proj.inverse(),
            position: view_inverse.transform_point3(Vec3::ZERO),
            direction: view_inverse
                .transform_vector3(Vec3::NEG_Z)
                .normalize_or_zero(),
            frustum: Frustum::from_matrix(view_proj),
            fov_y,
            aspect: self.aspect,
            near,
            far,
        };
    }

    fn collect_lights(&mut self, scene: &Scene) {
        self.environment = SceneEnvironment {
            sun_enabled: scene.sun.enabled,
            sun_direction: scene.sun.direction.normalize_or_zero(),
            sun_color: scene.sun.color,
            sun_power: scene.sun.power,
            sky_enabled: scene.sky_enabled,
        };

        if self.environment.sun_enabled {
            let shadow_limit = scene.terrain.as_ref().and_then(|t| t.shadow_distance);
            self.cascades.set_max_distance(shadow_limit);
            self.cascades.compute(
                self.environment.sun_direction,
                self.view.fov_y,
                self.view.aspect,
                self.view.near,
                self.view.far,
                self.view.view_inverse,
            );
        }

        let view_pos = self.view.position;
        let frustum = self.view.frustum;

        // Directional lights are global; no distance or frustum test applies.
        for (_, (light, transform)) in scene
            .world
            .query::<(&DirectionalLight, Option<&WorldTransform>)>()
            .iter()
        {
            let direction = transform
                .map(|t| t.0.forward())
                .unwrap_or(Vec3::NEG_Y)
                .normalize_or_zero();
            self.lights.push(RenderLight::directional(
                direction,
                light.color,
                light.intensity,
            ));
        }

        for (_, (light, transform)) in scene
            .world
            .query::<(&PointLight, &WorldTransform)>()
            .iter()
        {
            let position = transform.0.translation;
            if light_is_culled(position, light.range, light.clip_distance, view_pos, &frustum) {
                continue;
            }
            self.lights.push(RenderLight::point(
                position,
                light.range,
                light.color,
                light.intensity,
            ));
        }

        for (_, (light, transform)) in scene.world.query::<(&SpotLight, &WorldTransform)>().iter()
        {
            let position = transform.0.translation;
            if light_is_culled(position, light.range, light.clip_distance, view_pos, &frustum) {
                continue;
            }
            self.lights.push(RenderLight::spot(
                position,
                transform.0.forward(),
                light.range,
                light.inner_angle,
                light.outer_angle,
                light.color,
                light.intensity,
            ));
        }
    }

    fn collect_terrain(&mut self, scene: &Scene, assets: &Assets) {
        let Some(terrain) = &scene.terrain else {
            return;
        };

        let sun = self.environment.sun_enabled;
        let mut bin_masks: Vec<CascadeMask> = Vec::with_capacity(terrain.bins.len());
        let mut bin_visible: Vec<bool> = Vec::with_capacity(terrain.bins.len());

        for bin in &terrain.bins {
            let visible = self
                .view
                .frustum
                .intersects_sphere(bin.bounds.center, bin.bounds.radius);
            let mask = if sun {
                self.cascades.cull(bin.bounds.center, bin.bounds.radius)
            } else {
                CascadeMask::EMPTY
            };
            bin_visible.push(visible);
            bin_masks.push(mask);

            if !visible && mask.is_empty() {
                continue;
            }

            let material = self.resolve_material(assets, terrain.material, ShaderDomain::Terrain);
            let Some(resolved) = assets.materials.get(material) else {
                continue;
            };
            let shader = resolved.shader();
            let shadow_shader = resolved.shadow_shader();

            let id = self.primitives.alloc(RenderPrimitive::new(
                PrimitiveKind::Terrain {
                    mesh: bin.mesh,
                    bin: bin_masks.len() as u32 - 1,
                },
                Mat4::IDENTITY,
                material,
            ));

            if visible {
                self.deferred.add(id, material, shader);
                self.stats.terrain_bins_drawn += 1;
                self.stats.deferred_primitives += 1;
            }
            if !mask.is_empty() {
                self.cascades.add_primitive(
                    id,
                    ShaderDomain::Terrain,
                    material,
                    shadow_shader,
                    false,
                    mask,
                );
                self.stats.shadow_casters += 1;
            }
        }

        for layer in &terrain.foliage {
            self.collect_foliage_layer(layer, &bin_visible, &bin_masks, assets);
        }
    }

    fn collect_foliage_layer(
        &mut self,
        layer: &crate::scene::FoliageLayer,
        bin_visible: &[bool],
        bin_masks: &[CascadeMask],
        assets: &Assets,
    ) {
        let clip_sq = layer.clip_distance * layer.clip_distance;
        let view_pos = self.view.position;

        let mut transforms = Vec::new();
        let mut any_visible = false;
        let mut mask = CascadeMask::EMPTY;

        for instance in &layer.instances {
            let bin = instance.bin as usize;
            let drawn = bin_visible.get(bin).copied().unwrap_or(false)
                || bin_masks
                    .get(bin)
                    .map(|m| !m.is_empty())
                    .unwrap_or(false);
            if !drawn {
                continue;
            }
            let position = instance.transform.w_axis.truncate();
            if layer.clip_distance > 0.0 && (position - view_pos).length_squared() > clip_sq {
                continue;
            }
            transforms.push(instance.transform);
            any_visible |= bin_visible[bin];
            if let Some(bin_mask) = bin_masks.get(bin) {
                for index in bin_mask.iter() {
                    mask.set(index);
                }
            }
        }

        if transforms.is_empty() {
            return;
        }

        let material = self.resolve_material(assets, layer.material, ShaderDomain::MeshInstance);
        let Some(resolved) = assets.materials.get(material) else {
            return;
        };
        let shader = resolved.shader();
        let shadow_shader = resolved.shadow_shader();

        self.stats.foliage_instances += transforms.len() as u32;
        let id = self.primitives.alloc(RenderPrimitive::new(
            PrimitiveKind::FoliageInstances {
                mesh: layer.mesh,
                transforms,
            },
            Mat4::IDENTITY,
            material,
        ));

        if any_visible {
            self.deferred.add(id, material, shader);
            self.stats.deferred_primitives += 1;
        }

        // Foliage has no built-in depth bucket, so it only reaches the
        // cascades through a custom depth shader on its material.
        if layer.cast_shadow && !mask.is_empty() {
            if let Some(shadow_shader) = shadow_shader {
                self.cascades.add_primitive(
                    id,
                    ShaderDomain::MeshInstance,
                    material,
                    Some(shadow_shader),
                    false,
                    mask,
                );
                self.stats.shadow_casters += 1;
            }
        }
    }

    fn traverse(&mut self, scene: &Scene, assets: &Assets) {
        let items = gather_traverse_items(scene);
        self.stats.traversed = items.len() as u32;

        let survivors: Vec<CulledItem> = {
            let frustum = &self.view.frustum;
            let cascades = &self.cascades;
            let view_pos = self.view.position;
            let sun = self.environment.sun_enabled;

            items
                .into_par_iter()
                .filter_map(|item| {
                    let mesh = assets.meshes.get(item.mesh)?;
                    let sphere = mesh
                        .bounding_sphere()
                        .transformed(item.transform.matrix());
                    let distance_sq = sphere.distance_squared(view_pos);

                    // Hard cutoff: past the clip distance nothing is drawn,
                    // shadows included.
                    if item.clip_distance > 0.0
                        && distance_sq > item.clip_distance * item.clip_distance
                    {
                        return None;
                    }

                    let visible = frustum.intersects_sphere(sphere.center, sphere.radius);
                    let mask = if sun && item.cast_shadow {
                        cascades.cull(sphere.center, sphere.radius)
                    } else {
                        CascadeMask::EMPTY
                    };

                    if !visible && mask.is_empty() {
                        return None;
                    }

                    Some(CulledItem {
                        item,
                        sphere,
                        distance_sq,
                        visible,
                        mask,
                    })
                })
                .collect()
        };

        self.stats.culled = self.stats.traversed - survivors.len() as u32;

        for culled in survivors {
            self.emit_primitives(culled, assets);
        }
    }

    fn emit_primitives(&mut self, culled: CulledItem, assets: &Assets) {
        let domain = if culled.item.skinned {
            ShaderDomain::Skinned
        } else {
            ShaderDomain::Mesh
        };

        let requested = culled
            .item
            .material
            .unwrap_or_else(|| assets.default_material(domain));
        let material = self.resolve_material(assets, requested, domain);
        let Some(resolved) = assets.materials.get(material) else {
            return;
        };
        let shader = resolved.shader();
        let kind = resolved.kind();
        let shadow_shader = resolved.shadow_shader();

        let mut ids: Vec<PrimitiveId> = Vec::with_capacity(1);
        {
            let arena = &mut self.primitives;
            let collector = |primitive: RenderPrimitive| {
                ids.push(arena.alloc(primitive));
            };
            if culled.item.skinned {
                SkinnedMeshComponent(culled.item.mesh).collect_primitives(
                    &culled.item.transform,
                    material,
                    collector,
                );
            } else {
                MeshComponent(culled.item.mesh).collect_primitives(
                    &culled.item.transform,
                    material,
                    collector,
                );
            }
        }

        for id in ids {
            if culled.visible {
                if kind.is_translucent() {
                    let lights = self.gather_lights(&culled.sphere);
                    self.primitives.get_mut(id).lights = lights;
                    self.translucent.add(id, culled.distance_sq);
                    self.stats.translucent_primitives += 1;
                } else {
                    self.deferred.add(id, material, shader);
                    self.stats.deferred_primitives += 1;
                }
            }
            if !culled.mask.is_empty() {
                self.cascades.add_primitive(
                    id,
                    domain,
                    material,
                    shadow_shader,
                    false,
                    culled.mask,
                );
                self.stats.shadow_casters += 1;
            }
        }
    }

    /// Validates the material's domain against the primitive's. On mismatch
    /// the reference is discarded and the domain's default (checker) material
    /// takes its place; a broken assignment should degrade visibly, not
    /// crash the frame.
    fn resolve_material(
        &self,
        assets: &Assets,
        material: Handle<Material>,
        domain: ShaderDomain,
    ) -> Handle<Material> {
        match assets.materials.get(material) {
            Some(resolved) if resolved.domain() == domain => material,
            Some(resolved) => {
                log::warn!(
                    "Material '{}' has domain {:?} but the primitive is {:?}; using the default",
                    resolved.name(),
                    resolved.domain(),
                    domain
                );
                assets.default_material(domain)
            }
            None => {
                log::warn!("Dangling material handle; using the {domain:?} default");
                assets.default_material(domain)
            }
        }
    }

    /// Bounded forward light list for one translucent primitive: a linear
    /// scan with squared-distance rejection. Fine while forward primitive
    /// counts stay low.
    fn gather_lights(&self, sphere: &BoundingSphere) -> ForwardLightList {
        let mut list = ForwardLightList::default();
        for (index, light) in self.lights.iter().enumerate() {
            let affects = match light.kind {
                LightKind::Directional => true,
                LightKind::Point | LightKind::Spot => {
                    let reach = sphere.radius + light.radius;
                    light.position.distance_squared(sphere.center) <= reach * reach
                }
            };
            if affects && !list.push(index as u32) {
                break;
            }
        }
        list
    }
}

fn light_is_culled(
    position: Vec3,
    range: f32,
    clip_distance: f32,
    view_pos: Vec3,
    frustum: &Frustum,
) -> bool {
    if clip_distance > 0.0
        && position.distance_squared(view_pos) > clip_distance * clip_distance
    {
        return true;
    }
    !frustum.intersects_sphere(position, range)
}

struct TraverseItem {
    mesh: Handle<Mesh>,
    skinned: bool,
    transform: Transform,
    material: Option<Handle<Material>>,
    cast_shadow: bool,
    clip_distance: f32,
}

struct CulledItem {
    item: TraverseItem,
    sphere: BoundingSphere,
    distance_sq: f32,
    visible: bool,
    mask: CascadeMask,
}

fn gather_traverse_items(scene: &Scene) -> Vec<TraverseItem> {
    let mut items = Vec::new();

    for (_, (mesh, transform, material, visible, cast_shadow, clip)) in scene
        .world
        .query::<(
            &MeshComponent,
            &WorldTransform,
            Option<&MaterialComponent>,
            Option<&Visible>,
            Option<&CastShadow>,
            Option<&ClipDistance>,
        )>()
        .iter()
    {
        if !visible.copied().unwrap_or_default().0 {
            continue;
        }
        items.push(TraverseItem {
            mesh: mesh.0,
            skinned: false,
            transform: transform.0,
            material: material.map(|m| m.0),
            cast_shadow: cast_shadow.copied().unwrap_or_default().0,
            clip_distance: clip.copied().unwrap_or_default().0,
        });
    }

    for (_, (mesh, transform, material, visible, cast_shadow, clip)) in scene
        .world
        .query::<(
            &SkinnedMeshComponent,
            &WorldTransform,
            Option<&MaterialComponent>,
            Option<&Visible>,
            Option<&CastShadow>,
            Option<&ClipDistance>,
        )>()
        .iter()
    {
        if !visible.copied().unwrap_or_default().0 {
            continue;
        }
        items.push(TraverseItem {
            mesh: mesh.0,
            skinned: true,
            transform: transform.0,
            material: material.map(|m| m.0),
            cast_shadow: cast_shadow.copied().unwrap_or_default().0,
            clip_distance: clip.copied().unwrap_or_default().0,
        });
    }

    items
}
