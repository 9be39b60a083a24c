//! Split-range and frustum-fitting properties of the cascaded shadow maps.

use ember_renderer::asset::Handle;
use ember_renderer::render::cascade::{CascadeMask, ShadowCascades};
use ember_renderer::render::material::ShaderDomain;
use ember_renderer::render::primitive::{PrimitiveArena, PrimitiveKind, RenderPrimitive};
use ember_renderer::settings::CascadeSettings;
use glam::{Mat4, Vec3};

const FOV: f32 = 60.0 * std::f32::consts::PI / 180.0;

fn first_id() -> ember_renderer::render::primitive::PrimitiveId {
    let mut arena = PrimitiveArena::new();
    arena.alloc(RenderPrimitive::new(
        PrimitiveKind::Mesh {
            mesh: Handle::new(0),
        },
        Mat4::IDENTITY,
        Handle::new(0),
    ))
}

fn computed(settings: CascadeSettings, light_dir: Vec3) -> ShadowCascades {
    let mut shadows = ShadowCascades::new(settings, 1024);
    shadows.compute(light_dir, FOV, 16.0 / 9.0, 0.1, 1000.0, Mat4::IDENTITY);
    shadows
}

#[test]
fn ranges_start_at_near_and_strictly_increase() {
    let shadows = computed(CascadeSettings::default(), Vec3::new(-0.4, -1.0, -0.2));
    let ranges = shadows.ranges();

    assert_eq!(ranges.len(), shadows.count() + 1);
    assert!((ranges[0] - 0.1).abs() < 1e-6);
    for pair in ranges.windows(2) {
        assert!(pair[0] < pair[1], "ranges must increase: {ranges:?}");
    }
}

#[test]
fn split_scheme_is_geometric_with_scaled_tail() {
    let settings = CascadeSettings {
        count: 4,
        first_split: 7.0,
        growth: 2.2,
        far_widening: 0.05,
        last_scale: 1.5,
    };
    let shadows = computed(settings, Vec3::NEG_Y);
    let ranges = shadows.ranges();

    assert!((ranges[1] - 7.0).abs() < 1e-4);
    assert!((ranges[2] - 7.0 * 2.2).abs() < 1e-3);
    assert!((ranges[3] - 7.0 * 2.2 * 2.2).abs() < 1e-2);
    assert!((ranges[4] - 7.0 * 2.2 * 2.2 * 2.2 * 1.5).abs() < 1e-1);
}

#[test]
fn override_clamps_the_draw_distance() {
    let mut shadows = ShadowCascades::new(CascadeSettings::default(), 1024);
    shadows.set_max_distance(Some(50.0));
    shadows.compute(Vec3::NEG_Y, FOV, 1.0, 0.1, 1000.0, Mat4::IDENTITY);

    assert!((shadows.max_distance() - 50.0).abs() < 1e-4);
    // Still strictly increasing under the clamp.
    for pair in shadows.ranges().windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[test]
fn every_cascade_covers_its_own_depth_slice() {
    let shadows = computed(CascadeSettings::default(), Vec3::NEG_Y);
    let ranges = shadows.ranges().to_vec();

    for index in 0..shadows.count() {
        let mid = (ranges[index] + ranges[index + 1]) * 0.5;
        // Camera at origin looking down -Z: a point in the middle of the
        // slice must intersect its cascade.
        let mask = shadows.cull(Vec3::new(0.0, 0.0, -mid), 1.0);
        assert!(
            mask.contains(index),
            "point at depth {mid} missed cascade {index}"
        );
    }
}

#[test]
fn cascades_overlap_near_split_boundaries() {
    let shadows = computed(CascadeSettings::default(), Vec3::NEG_Y);
    let boundary = shadows.ranges()[1];

    // A sphere straddling the first split boundary must land in both
    // cascades; over-inclusion here is intentional.
    let mask = shadows.cull(Vec3::new(0.0, 0.0, -boundary), 2.0);
    assert!(mask.contains(0));
    assert!(mask.contains(1));
}

#[test]
fn offscreen_caster_along_the_light_is_included() {
    let shadows = computed(CascadeSettings::default(), Vec3::NEG_Y);

    // Hovering far above the camera frustum, straight up the light
    // direction: invisible to the camera, still a shadow caster.
    let mask = shadows.cull(Vec3::new(0.0, 30.0, -5.0), 1.0);
    assert!(!mask.is_empty());
}

#[test]
fn far_off_axis_sphere_is_rejected_by_every_cascade() {
    let shadows = computed(CascadeSettings::default(), Vec3::NEG_Y);
    let mask = shadows.cull(Vec3::new(10_000.0, 0.0, 0.0), 1.0);
    assert!(mask.is_empty());
}

#[test]
fn view_proj_maps_slice_center_into_clip_space() {
    let shadows = computed(CascadeSettings::default(), Vec3::new(-0.3, -1.0, -0.1));
    let ranges = shadows.ranges().to_vec();

    for (index, cascade) in shadows.cascades().iter().enumerate() {
        let mid = (ranges[index] + ranges[index + 1]) * 0.5;
        let clip = cascade.view_proj * Vec3::new(0.0, 0.0, -mid).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() <= 1.0 + 1e-3, "cascade {index}: {ndc:?}");
        assert!(ndc.y.abs() <= 1.0 + 1e-3, "cascade {index}: {ndc:?}");
        assert!((-1e-3..=1.0 + 1e-3).contains(&ndc.z), "cascade {index}: {ndc:?}");
    }
}

#[test]
fn mask_fanout_reaches_only_flagged_cascades() {
    let mut shadows = ShadowCascades::new(CascadeSettings::default(), 512);
    let mut mask = CascadeMask::EMPTY;
    mask.set(1);
    mask.set(3);

    shadows.add_primitive(
        first_id(),
        ShaderDomain::Mesh,
        Handle::new(0),
        None,
        false,
        mask,
    );

    let counts: Vec<usize> = shadows
        .cascades()
        .iter()
        .map(|c| c.batch.primitive_count())
        .collect();
    assert_eq!(counts, vec![0, 1, 0, 1]);

    // Empty mask: valid no-op.
    shadows.add_primitive(
        first_id(),
        ShaderDomain::Mesh,
        Handle::new(0),
        None,
        false,
        CascadeMask::EMPTY,
    );
    let total: usize = shadows
        .cascades()
        .iter()
        .map(|c| c.batch.primitive_count())
        .sum();
    assert_eq!(total, 2);
}
