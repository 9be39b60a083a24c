pub mod batch;
mod buffers;
pub mod cascade;
pub mod context;
pub mod debug;
mod environment;
pub mod light;
pub mod material;
pub mod module;
mod pass;
pub mod pipeline;
mod postprocess;
pub mod primitive;
pub mod scene;
mod ssao;
pub mod target;
pub mod uniforms;
pub mod vertex;

pub use batch::{DeferredBatch, ShadowBatch, TranslucentBatch};
pub use cascade::{CascadeMask, ShadowCascades};
pub use context::GpuContext;
pub use debug::RenderDebug;
pub use light::{LightKind, RenderLight, MAX_DEFERRED_LIGHTS, MAX_FORWARD_LIGHTS};
pub use material::{Material, MaterialFlags, MaterialKind, MaterialShader, ShaderDomain};
pub use module::RenderModule;
pub use pipeline::RenderPipeline;
pub use primitive::{PrimitiveArena, PrimitiveId, PrimitiveKind, RenderPrimitive};
pub use scene::{RenderScene, SceneEnvironment, SceneView};
pub use target::RenderTarget;
pub use vertex::Vertex;
