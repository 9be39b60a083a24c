pub mod bounds;
pub mod frustum;

pub use bounds::{BoundingBox, BoundingSphere};
pub use frustum::{Frustum, Plane};
