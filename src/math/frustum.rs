use glam::{Mat4, Vec3, Vec4};

use super::BoundingBox;

/// Plane in Hessian normal form: `dot(normal, p) + constant = 0`.
/// Points with a positive signed distance are on the inside.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub constant: f32,
}

impl Plane {
    pub fn from_vec4(v: Vec4) -> Self {
        Self {
            normal: v.truncate(),
            constant: v.w,
        }
    }

    pub fn normalized(self) -> Self {
        let length = self.normal.length();
        if length <= f32::EPSILON {
            return self;
        }
        Self {
            normal: self.normal / length,
            constant: self.constant / length,
        }
    }

    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.constant
    }
}

/// View frustum as 6 inward-facing planes: left, right, bottom, top, near, far.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the planes from a view-projection matrix (row combinations of
    /// the matrix, Gribb/Hartmann). Works for perspective and orthographic
    /// projections alike.
    pub fn from_matrix(m: Mat4) -> Self {
        let row = |i: usize| m.row(i);
        let planes = [
            Plane::from_vec4(row(3) + row(0)).normalized(), // left
            Plane::from_vec4(row(3) - row(0)).normalized(), // right
            Plane::from_vec4(row(3) + row(1)).normalized(), // bottom
            Plane::from_vec4(row(3) - row(1)).normalized(), // top
            Plane::from_vec4(row(3) + row(2)).normalized(), // near
            Plane::from_vec4(row(3) - row(2)).normalized(), // far
        ];
        Self { planes }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Conservative sphere test: rejects only when the sphere is fully on the
    /// outside of some plane. A sphere straddling a plane is accepted.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }

    /// Conservative box test using the corner most aligned with each plane
    /// normal.
    pub fn intersects_box(&self, bounds: &BoundingBox) -> bool {
        for plane in &self.planes {
            let p = Vec3::new(
                if plane.normal.x > 0.0 {
                    bounds.max.x
                } else {
                    bounds.min.x
                },
                if plane.normal.y > 0.0 {
                    bounds.max.y
                } else {
                    bounds.min.y
                },
                if plane.normal.z > 0.0 {
                    bounds.max.z
                } else {
                    bounds.min.z
                },
            );
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perspective_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0);
        Frustum::from_matrix(proj)
    }

    #[test]
    fn point_in_front_is_inside() {
        let frustum = perspective_frustum();
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -1.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn sphere_behind_camera_is_rejected() {
        let frustum = perspective_frustum();
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, 5.0), 1.0));
    }

    #[test]
    fn sphere_straddling_a_plane_is_accepted() {
        let frustum = perspective_frustum();
        // Center just outside the near plane, radius reaching across it.
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, 0.0), 0.2));
    }

    #[test]
    fn sphere_past_far_plane_is_rejected() {
        let frustum = perspective_frustum();
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, -150.0), 1.0));
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -99.5), 1.0));
    }

    #[test]
    fn box_test_matches_sphere_test_on_axis() {
        let frustum = perspective_frustum();
        let inside = BoundingBox::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        let outside = BoundingBox::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        assert!(frustum.intersects_box(&inside));
        assert!(!frustum.intersects_box(&outside));
    }

    #[test]
    fn works_with_full_view_projection() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 50.0);
        let frustum = Frustum::from_matrix(proj * view);
        assert!(frustum.intersects_sphere(Vec3::ZERO, 1.0));
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 2.0, 20.0), 1.0));
    }
}
