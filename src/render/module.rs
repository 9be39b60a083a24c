use glam::UVec2;
use instant::Instant;

use crate::asset::Assets;
use crate::render::context::GpuContext;
use crate::render::debug::RenderDebug;
use crate::render::pipeline::{PipelineStats, RenderPipeline};
use crate::render::scene::{FrameStats, RenderScene};
use crate::render::target::{RenderTarget, LDR_FORMAT};
use crate::scene::Scene;
use crate::settings::RenderSettings;

/// Engine-facing entry point: owns the GPU context, the per-frame scene
/// snapshot, and the pass pipeline. The update loop calls
/// `begin_render` / `render` / `end_render` exactly once per displayed
/// frame.
pub struct RenderModule {
    context: GpuContext,
    pipeline: RenderPipeline,
    scene: RenderScene,
    debug: RenderDebug,
    started: Instant,
}

impl RenderModule {
    /// Brings up the GPU and all pass resources. Blocks on adapter/device
    /// acquisition.
    pub fn new(settings: RenderSettings) -> Self {
        Self::with_output_format(settings, LDR_FORMAT)
    }

    /// As [`new`](Self::new), with the format of the final target the caller
    /// will hand to `render` (a swapchain may not be LDR RGBA).
    pub fn with_output_format(
        settings: RenderSettings,
        output_format: wgpu::TextureFormat,
    ) -> Self {
        let context = GpuContext::new_blocking();
        let pipeline = RenderPipeline::new(&context, &settings, output_format);
        let scene = RenderScene::new(&settings);
        Self {
            context,
            pipeline,
            scene,
            debug: RenderDebug::new(),
            started: Instant::now(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.context.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.context.queue
    }

    /// Off-screen target the caller can render into and read back.
    pub fn create_render_target(&self, label: &str, size: UVec2) -> RenderTarget {
        RenderTarget::new(&self.context.device, label, size, LDR_FORMAT)
    }

    /// Uploads any meshes that are not on the GPU yet. Call after asset
    /// mutation, before the next frame.
    pub fn prepare_assets(&self, assets: &mut Assets) {
        for index in 0..assets.meshes.len() {
            let handle = crate::asset::Handle::new(index as u32);
            if let Some(mesh) = assets.meshes.get_mut(handle) {
                mesh.upload(&self.context.device);
            }
        }
    }

    /// Fire-and-forget debug draw queue; drained into the next frame.
    pub fn debug(&mut self) -> &mut RenderDebug {
        &mut self.debug
    }

    /// Marks the dynamic sky environment for refiltering (sun moved, sky
    /// parameters changed). Cheap to call; the work happens next frame.
    pub fn request_update_sky(&mut self) {
        self.pipeline.environment_mut().request_update_sky();
    }

    pub fn set_grid_enabled(&mut self, enabled: bool) {
        self.pipeline.set_grid_enabled(enabled);
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.pipeline.set_exposure(exposure);
    }

    /// Builds this frame's snapshot from the scene and opens the frame.
    pub fn begin_render(&mut self, scene: &Scene, assets: &Assets, extent: UVec2) {
        self.scene
            .set_aspect(extent.x as f32 / extent.y.max(1) as f32);
        self.scene.build(scene, assets);

        let mut boxes = Vec::new();
        self.debug
            .drain_frame(|position, scale, color| boxes.push((position, scale, color)));
        for (position, scale, color) in boxes {
            self.scene.push_debug_box(position, scale, color, assets);
        }

        let time = self.started.elapsed().as_secs_f32();
        self.pipeline
            .begin(&self.context, extent, &mut self.scene, assets, time);
    }

    /// Runs the pass sequence into `output` (window surface view or an
    /// off-screen target's view).
    pub fn render(&mut self, assets: &Assets, output: &wgpu::TextureView) {
        self.pipeline
            .render(&self.context, &mut self.scene, assets, output);
    }

    /// Submits the frame.
    pub fn end_render(&mut self) {
        self.pipeline.end(&self.context);
    }

    pub fn render_scene(&self) -> &RenderScene {
        &self.scene
    }

    pub fn frame_stats(&self) -> &FrameStats {
        self.scene.stats()
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }
}
