use glam::{Mat4, Vec3};

/// Axis-aligned box in whatever space the caller keeps its points in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut result = Self::EMPTY;
        for p in points {
            result.expand(p);
        }
        result
    }

    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Grows the box symmetrically about its center by `factor` (1.0 = no change).
    pub fn inflated(&self, factor: f32) -> Self {
        let center = self.center();
        let extents = self.extents() * factor;
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min, self.max);
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// Transforms all 8 corners and rebuilds an axis-aligned box around them.
    pub fn transformed(&self, matrix: Mat4) -> Self {
        Self::from_points(self.corners().map(|c| matrix.transform_point3(c)))
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        let center = self.center();
        BoundingSphere {
            center,
            radius: (self.max - center).length(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// World-space sphere for a local sphere under an affine transform.
    /// The radius uses the largest scale axis, so the result is conservative
    /// for non-uniform scale.
    pub fn transformed(&self, matrix: Mat4) -> Self {
        let center = matrix.transform_point3(self.center);
        let scale = Vec3::new(
            matrix.x_axis.truncate().length(),
            matrix.y_axis.truncate().length(),
            matrix.z_axis.truncate().length(),
        );
        Self {
            center,
            radius: self.radius * scale.max_element(),
        }
    }

    pub fn distance_squared(&self, point: Vec3) -> f32 {
        (self.center - point).length_squared()
    }
}
