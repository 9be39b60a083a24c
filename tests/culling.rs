//! Conservative frustum culling properties.

use ember_renderer::math::{BoundingBox, BoundingSphere, Frustum};
use glam::{Mat4, Quat, Vec3};

fn view_frustum() -> Frustum {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
    Frustum::from_matrix(proj * view)
}

#[test]
fn sphere_fully_outside_any_plane_is_rejected() {
    let frustum = view_frustum();

    // Behind the camera.
    assert!(!frustum.intersects_sphere(Vec3::new(0.0, 2.0, 20.0), 1.0));
    // Far beyond the far plane.
    assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, -200.0), 5.0));
    // Far off to the side.
    assert!(!frustum.intersects_sphere(Vec3::new(500.0, 0.0, 0.0), 5.0));
}

#[test]
fn sphere_inside_is_accepted() {
    let frustum = view_frustum();
    assert!(frustum.intersects_sphere(Vec3::ZERO, 1.0));
    assert!(frustum.intersects_sphere(Vec3::new(0.0, 1.0, -20.0), 2.0));
}

#[test]
fn sphere_straddling_one_plane_is_accepted() {
    let frustum = view_frustum();

    // Center just outside the left plane, radius reaching back across it.
    // Find a point slightly past the plane by walking along -x from an
    // inside point until rejection, then check the straddling radius.
    let mut outside = Vec3::new(0.0, 0.0, 0.0);
    while frustum.intersects_sphere(outside, 0.01) {
        outside.x -= 0.5;
    }
    assert!(
        frustum.intersects_sphere(outside, 2.0),
        "sphere straddling the plane at {outside:?} must be kept"
    );
}

#[test]
fn sphere_past_radius_on_any_plane_is_rejected() {
    let frustum = view_frustum();

    for plane in &frustum.planes {
        // Push an inside point well past each plane in turn; the signed
        // distance to that plane ends up far below -radius.
        let center_inside = Vec3::new(0.0, 1.0, 0.0);
        let distance = plane.distance_to_point(center_inside);
        let far_outside = center_inside - plane.normal * (distance + 10.0);
        assert!(
            !frustum.intersects_sphere(far_outside, 1.0),
            "sphere outside plane {plane:?} must be culled"
        );
    }
}

#[test]
fn box_culling_agrees_with_contained_sphere() {
    let frustum = view_frustum();

    let inside = BoundingBox::new(Vec3::new(-1.0, -1.0, -3.0), Vec3::new(1.0, 1.0, -1.0));
    assert!(frustum.intersects_box(&inside));

    let outside = BoundingBox::new(Vec3::new(400.0, 0.0, 0.0), Vec3::new(402.0, 2.0, 2.0));
    assert!(!frustum.intersects_box(&outside));
}

#[test]
fn world_sphere_tracks_transform_scale_and_translation() {
    let local = BoundingSphere::new(Vec3::ZERO, 1.0);
    let matrix = Mat4::from_scale_rotation_translation(
        Vec3::new(2.0, 0.5, 1.0),
        Quat::from_rotation_y(1.2),
        Vec3::new(10.0, 0.0, -4.0),
    );
    let world = local.transformed(matrix);

    assert!(world.center.abs_diff_eq(Vec3::new(10.0, 0.0, -4.0), 1e-5));
    // Conservative: radius follows the largest scale axis.
    assert!((world.radius - 2.0).abs() < 1e-5);
}

#[test]
fn frustum_from_orthographic_matrix_works() {
    let proj = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 0.1, 50.0);
    let frustum = Frustum::from_matrix(proj);

    assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -25.0), 1.0));
    assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, -60.0), 1.0));
    assert!(!frustum.intersects_sphere(Vec3::new(20.0, 0.0, -25.0), 1.0));
}
