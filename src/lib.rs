pub mod asset;
pub mod math;
pub mod render;
pub mod scene;
pub mod settings;

pub use asset::{Assets, Handle, Mesh};
pub use render::{RenderDebug, RenderModule, RenderScene};
pub use scene::{Camera, Scene};
pub use settings::RenderSettings;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
