use glam::Vec3;

use crate::scene::terrain::Terrain;
use crate::scene::Camera;

/// Global sun settings read by the renderer each frame.
#[derive(Clone, Copy, Debug)]
pub struct SunSettings {
    pub enabled: bool,
    pub direction: Vec3,
    pub color: Vec3,
    pub power: f32,
}

impl Default for SunSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
            color: Vec3::ONE,
            power: 4.0,
        }
    }
}

/// The scene graph surface the renderer consumes: an ECS world of renderable
/// entities, the active camera, the sun/sky settings, and optional terrain.
/// Everything else about scene management belongs to the engine layer.
pub struct Scene {
    pub world: hecs::World,
    pub camera: Option<Camera>,
    pub sun: SunSettings,
    pub sky_enabled: bool,
    pub terrain: Option<Terrain>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: hecs::World::new(),
            camera: Some(Camera::default()),
            sun: SunSettings::default(),
            sky_enabled: false,
            terrain: None,
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
