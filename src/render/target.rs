use glam::UVec2;

/// A single off-screen color target, usable both as an attachment and as a
/// sampled input to a later pass.
pub struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    size: UVec2,
}

impl RenderTarget {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        size: UVec2,
        format: wgpu::TextureFormat,
    ) -> Self {
        assert!(size.x > 0 && size.y > 0, "render target must be non-empty");
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format,
            size,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }
}

/// Shared depth texture: written by the opaque geometry pass, depth-tested
/// (never written) by the forward pass of the same frame.
pub struct DepthTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

impl DepthTarget {
    pub fn new(device: &wgpu::Device, size: UVec2) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("SceneDepth"),
            size: wgpu::Extent3d {
                width: size.x.max(1),
                height: size.y.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

pub const GBUFFER_ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const GBUFFER_NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const GBUFFER_BRDF_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const GBUFFER_EMISSIVE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const LDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const AO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

/// The geometry pass attachments plus the depth buffer shared with the
/// forward pass.
pub struct GBuffer {
    pub albedo: RenderTarget,
    pub normal: RenderTarget,
    pub brdf: RenderTarget,
    pub emissive: RenderTarget,
    pub depth: DepthTarget,
    size: UVec2,
}

impl GBuffer {
    pub fn new(device: &wgpu::Device, size: UVec2) -> Self {
        Self {
            albedo: RenderTarget::new(device, "GBufferAlbedo", size, GBUFFER_ALBEDO_FORMAT),
            normal: RenderTarget::new(device, "GBufferNormal", size, GBUFFER_NORMAL_FORMAT),
            brdf: RenderTarget::new(device, "GBufferBrdf", size, GBUFFER_BRDF_FORMAT),
            emissive: RenderTarget::new(device, "GBufferEmissive", size, GBUFFER_EMISSIVE_FORMAT),
            depth: DepthTarget::new(device, size),
            size,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn color_formats() -> [Option<wgpu::ColorTargetState>; 4] {
        [
            Some(GBUFFER_ALBEDO_FORMAT.into()),
            Some(GBUFFER_NORMAL_FORMAT.into()),
            Some(GBUFFER_BRDF_FORMAT.into()),
            Some(GBUFFER_EMISSIVE_FORMAT.into()),
        ]
    }
}
