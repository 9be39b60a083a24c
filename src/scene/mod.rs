pub mod camera;
pub mod components;
pub mod scene;
pub mod terrain;
pub mod transform;

pub use camera::Camera;
pub use scene::{Scene, SunSettings};
pub use terrain::{FoliageInstance, FoliageLayer, Terrain, TerrainBin};
pub use transform::Transform;
