use glam::{Mat4, Vec3};

use crate::asset::Handle;
use crate::math::{BoundingBox, Frustum};
use crate::render::batch::ShadowBatch;
use crate::render::material::{Material, MaterialShader, ShaderDomain};
use crate::render::primitive::PrimitiveId;
use crate::settings::CascadeSettings;

pub const MAX_CASCADES: usize = 8;

/// Which cascades a shadow caster intersects this frame. A caster near a
/// split boundary can sit in several cascades at once; that over-inclusion is
/// what keeps the boundary free of holes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CascadeMask(u32);

impl CascadeMask {
    pub const EMPTY: Self = Self(0);

    pub fn set(&mut self, index: usize) {
        debug_assert!(index < MAX_CASCADES);
        self.0 |= 1 << index;
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0 & (1 << index) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_CASCADES).filter(move |&i| self.contains(i))
    }
}

/// Layered depth texture holding every cascade's shadow map: one layer view
/// per cascade for rendering, one array view plus comparison sampler for the
/// lighting pass (hardware PCF).
pub struct ShadowMapArray {
    _texture: wgpu::Texture,
    array_view: wgpu::TextureView,
    layer_views: Vec<wgpu::TextureView>,
    sampler: wgpu::Sampler,
}

impl ShadowMapArray {
    fn new(device: &wgpu::Device, layers: u32, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("CascadeShadowMaps"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: layers.max(1),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let array_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("CascadeShadowMapsArrayView"),
            format: Some(wgpu::TextureFormat::Depth32Float),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            aspect: wgpu::TextureAspect::All,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: Some(layers.max(1)),
            ..Default::default()
        });

        let mut layer_views = Vec::with_capacity(layers.max(1) as usize);
        for layer in 0..layers.max(1) {
            layer_views.push(texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&format!("CascadeShadowMapLayer{layer}")),
                format: Some(wgpu::TextureFormat::Depth32Float),
                dimension: Some(wgpu::TextureViewDimension::D2),
                aspect: wgpu::TextureAspect::All,
                base_mip_level: 0,
                mip_level_count: None,
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            }));
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("CascadeShadowSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 1.0,
            ..Default::default()
        });

        Self {
            _texture: texture,
            array_view,
            layer_views,
            sampler,
        }
    }

    pub fn array_view(&self) -> &wgpu::TextureView {
        &self.array_view
    }

    pub fn layer_view(&self, index: usize) -> &wgpu::TextureView {
        &self.layer_views[index]
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

/// One directional-light cascade: culling frustum, light view-projection,
/// and its depth batch. The shadow map itself lives in the owning
/// [`ShadowCascades`]' layered texture.
pub struct ShadowCascade {
    pub frustum: Frustum,
    pub view_proj: Mat4,
    pub batch: ShadowBatch,
}

impl ShadowCascade {
    fn new() -> Self {
        Self {
            frustum: Frustum::default(),
            view_proj: Mat4::IDENTITY,
            batch: ShadowBatch::new(),
        }
    }
}

/// Cascaded shadow maps for the sun. Split ranges follow a geometric scheme
/// (see [`CascadeSettings`]); the per-cascade light frustum is refit every
/// frame around the camera sub-frustum it covers.
pub struct ShadowCascades {
    cascades: Vec<ShadowCascade>,
    /// `count + 1` entries; `ranges[0]` is the camera near plane after
    /// [`compute`](Self::compute) ran, `ranges[last]` the shadow draw
    /// distance.
    ranges: Vec<f32>,
    settings: CascadeSettings,
    shadow_size: u32,
    max_distance_override: Option<f32>,
    targets: Option<ShadowMapArray>,
}

impl ShadowCascades {
    pub fn new(settings: CascadeSettings, shadow_size: u32) -> Self {
        assert!(settings.count as usize <= MAX_CASCADES);
        assert!(shadow_size > 0, "shadow map size must be non-zero");

        let count = settings.count as usize;
        let mut cascades = Vec::with_capacity(count);
        for _ in 0..count {
            cascades.push(ShadowCascade::new());
        }

        let mut result = Self {
            cascades,
            ranges: vec![0.0; count + 1],
            settings,
            shadow_size,
            max_distance_override: None,
            targets: None,
        };
        result.compute_ranges(0.0);
        result
    }

    pub fn count(&self) -> usize {
        self.cascades.len()
    }

    pub fn ranges(&self) -> &[f32] {
        &self.ranges
    }

    /// Shadow draw distance (the far edge of the last cascade).
    pub fn max_distance(&self) -> f32 {
        *self.ranges.last().unwrap()
    }

    /// Clamps the last range; terrain scenes use this to limit how far sun
    /// shadows are drawn. `None` restores the split scheme's own distance.
    pub fn set_max_distance(&mut self, distance: Option<f32>) {
        self.max_distance_override = distance;
    }

    pub fn cascades(&self) -> &[ShadowCascade] {
        &self.cascades
    }

    pub fn cascades_mut(&mut self) -> &mut [ShadowCascade] {
        &mut self.cascades
    }

    /// One-time allocation of the layered shadow map.
    pub fn create_targets(&mut self, device: &wgpu::Device) {
        if self.targets.is_none() {
            self.targets = Some(ShadowMapArray::new(
                device,
                self.cascades.len() as u32,
                self.shadow_size,
            ));
        }
    }

    pub fn targets(&self) -> Option<&ShadowMapArray> {
        self.targets.as_ref()
    }

    fn compute_ranges(&mut self, near: f32) {
        let count = self.cascades.len();
        self.ranges[0] = near;
        let mut split = self.settings.first_split.max(near + 0.01);
        for i in 1..=count {
            self.ranges[i] = split;
            split *= self.settings.growth;
        }
        self.ranges[count] *= self.settings.last_scale;

        if let Some(limit) = self.max_distance_override {
            // Keep the splits strictly increasing even under a tight clamp.
            let floor = self.ranges[count - 1] * 1.01;
            self.ranges[count] = limit.max(floor);
        }
    }

    /// Refits every cascade to the camera. Runs once per frame while the sun
    /// is enabled, before any culling against the cascade frusta.
    pub fn compute(
        &mut self,
        light_dir: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        _far: f32,
        view_inverse: Mat4,
    ) {
        self.compute_ranges(near);

        let light_dir = light_dir.normalize_or_zero();
        let up = if light_dir.dot(Vec3::Y).abs() > 0.95 {
            Vec3::Z
        } else {
            Vec3::Y
        };

        let tan_half_y = (fov_y * 0.5).tan();
        let tan_half_x = tan_half_y * aspect;
        let depth_margin = self.max_distance() * 0.5;

        for index in 0..self.cascades.len() {
            let cascade_near = self.ranges[index];
            // Widen each successive cascade a little so casters right on a
            // split boundary stay covered while the camera turns.
            let cascade_far =
                self.ranges[index + 1] * (1.0 + index as f32 * self.settings.far_widening);

            let mut world_corners = [Vec3::ZERO; 8];
            let mut corner = 0;
            for depth in [cascade_near.max(0.01), cascade_far] {
                let y = tan_half_y * depth;
                let x = tan_half_x * depth;
                for (sx, sy) in [(-1.0f32, -1.0f32), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
                    let camera_space = Vec3::new(sx * x, sy * y, -depth);
                    world_corners[corner] = view_inverse.transform_point3(camera_space);
                    corner += 1;
                }
            }

            let world_box = BoundingBox::from_points(world_corners);
            let center = world_box.center();

            let view = Mat4::look_at_rh(center, center + light_dir, up);
            let light_box =
                BoundingBox::from_points(world_corners.map(|c| view.transform_point3(c)))
                    .inflated(1.2);

            // Light space is right-handed: covered geometry sits at negative
            // z. The depth margin pulls the near plane toward the light so
            // casters outside the fitted box still land in the map.
            let proj = Mat4::orthographic_rh(
                light_box.min.x,
                light_box.max.x,
                light_box.min.y,
                light_box.max.y,
                -light_box.max.z - depth_margin,
                -light_box.min.z + depth_margin,
            );

            let cascade = &mut self.cascades[index];
            cascade.view_proj = proj * view;
            cascade.frustum = Frustum::from_matrix(cascade.view_proj);
        }
    }

    /// Tests a world-space sphere against every cascade frustum
    /// independently.
    pub fn cull(&self, center: Vec3, radius: f32) -> CascadeMask {
        let mut mask = CascadeMask::EMPTY;
        for (index, cascade) in self.cascades.iter().enumerate() {
            if cascade.frustum.intersects_sphere(center, radius) {
                mask.set(index);
            }
        }
        mask
    }

    /// Fans the caster out to each flagged cascade's batch. An empty mask is
    /// a valid no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn add_primitive(
        &mut self,
        id: PrimitiveId,
        domain: ShaderDomain,
        material: Handle<Material>,
        custom_shadow: Option<Handle<MaterialShader>>,
        force_default: bool,
        mask: CascadeMask,
    ) {
        for index in mask.iter() {
            if let Some(cascade) = self.cascades.get_mut(index) {
                cascade
                    .batch
                    .add(id, domain, material, custom_shadow, force_default);
            }
        }
    }

    pub fn reset(&mut self) {
        for cascade in &mut self.cascades {
            cascade.batch.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cascades() -> ShadowCascades {
        ShadowCascades::new(CascadeSettings::default(), 1024)
    }

    #[test]
    fn mask_set_and_iter() {
        let mut mask = CascadeMask::EMPTY;
        assert!(mask.is_empty());
        mask.set(0);
        mask.set(2);
        assert!(mask.contains(0));
        assert!(!mask.contains(1));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn ranges_are_strictly_increasing_from_near() {
        let mut shadows = cascades();
        shadows.compute(
            Vec3::new(-0.3, -1.0, -0.2),
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            1000.0,
            Mat4::IDENTITY,
        );

        let ranges = shadows.ranges();
        assert_eq!(ranges[0], 0.1);
        for pair in ranges.windows(2) {
            assert!(pair[0] < pair[1], "ranges not increasing: {ranges:?}");
        }
    }

    #[test]
    fn geometric_splits_follow_settings() {
        let shadows = ShadowCascades::new(
            CascadeSettings {
                count: 3,
                first_split: 7.0,
                growth: 2.2,
                far_widening: 0.05,
                last_scale: 1.5,
            },
            512,
        );
        let ranges = shadows.ranges();
        assert!((ranges[1] - 7.0).abs() < 1e-5);
        assert!((ranges[2] - 15.4).abs() < 1e-4);
        assert!((ranges[3] - 15.4 * 2.2 * 1.5).abs() < 1e-3);
    }

    #[test]
    fn max_distance_override_clamps_last_range() {
        let mut shadows = cascades();
        shadows.set_max_distance(Some(60.0));
        shadows.compute(
            Vec3::NEG_Y,
            60f32.to_radians(),
            1.0,
            0.1,
            1000.0,
            Mat4::IDENTITY,
        );
        assert!((shadows.max_distance() - 60.0).abs() < 1e-5);
        let ranges = shadows.ranges();
        assert!(ranges[ranges.len() - 2] < ranges[ranges.len() - 1]);
    }

    #[test]
    fn first_cascade_covers_geometry_near_the_camera() {
        let mut shadows = cascades();
        // Camera at origin looking down -Z, sun straight down.
        shadows.compute(
            Vec3::NEG_Y,
            60f32.to_radians(),
            1.0,
            0.1,
            1000.0,
            Mat4::IDENTITY,
        );

        let mask = shadows.cull(Vec3::new(0.0, 0.0, -5.0), 1.0);
        assert!(mask.contains(0), "close-range caster missed cascade 0");

        // Far outside every cascade's lateral extent.
        let far_away = shadows.cull(Vec3::new(5000.0, 0.0, 0.0), 1.0);
        assert!(far_away.is_empty());
    }

    #[test]
    fn caster_above_the_frustum_still_casts_into_the_map() {
        let mut shadows = cascades();
        shadows.compute(
            Vec3::NEG_Y,
            60f32.to_radians(),
            1.0,
            0.1,
            1000.0,
            Mat4::IDENTITY,
        );
        // Tall occluder hovering over the first cascade's footprint: outside
        // the camera frustum, inside the light's depth-extended box.
        let mask = shadows.cull(Vec3::new(0.0, 15.0, -5.0), 1.0);
        assert!(!mask.is_empty());
    }

    #[test]
    fn add_primitive_fans_out_by_mask() {
        let mut shadows = cascades();
        let mut mask = CascadeMask::EMPTY;
        mask.set(0);
        mask.set(1);

        shadows.add_primitive(
            PrimitiveId::from_raw(0),
            ShaderDomain::Mesh,
            Handle::new(0),
            None,
            false,
            mask,
        );

        assert_eq!(shadows.cascades()[0].batch.primitive_count(), 1);
        assert_eq!(shadows.cascades()[1].batch.primitive_count(), 1);
        assert_eq!(shadows.cascades()[2].batch.primitive_count(), 0);

        shadows.add_primitive(
            PrimitiveId::from_raw(1),
            ShaderDomain::Mesh,
            Handle::new(0),
            None,
            false,
            CascadeMask::EMPTY,
        );
        assert_eq!(shadows.cascades()[0].batch.primitive_count(), 1);
    }

    #[test]
    fn reset_clears_every_cascade_batch() {
        let mut shadows = cascades();
        let mut mask = CascadeMask::EMPTY;
        mask.set(0);
        shadows.add_primitive(
            PrimitiveId::from_raw(0),
            ShaderDomain::Mesh,
            Handle::new(0),
            None,
            false,
            mask,
        );
        shadows.reset();
        assert!(shadows.cascades().iter().all(|c| c.batch.is_empty()));
    }
}
