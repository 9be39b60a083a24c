/// Headless GPU bring-up. The renderer draws into caller-supplied targets,
/// so no surface or window is involved here.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub supports_float32_filterable: bool,
}

impl GpuContext {
    pub async fn new() -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to find adapter");

        log::info!("Using adapter: {:?}", adapter.get_info());
        log::info!("Using backend: {:?}", adapter.get_info().backend);
        let adapter_features = adapter.features();

        let mut required_features = wgpu::Features::empty();
        let supports_float32_filterable =
            adapter_features.contains(wgpu::Features::FLOAT32_FILTERABLE);
        if supports_float32_filterable {
            required_features |= wgpu::Features::FLOAT32_FILTERABLE;
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .expect("Failed to create device");

        Self {
            device,
            queue,
            supports_float32_filterable,
        }
    }

    /// Blocking constructor for callers without an async runtime.
    pub fn new_blocking() -> Self {
        pollster::block_on(Self::new())
    }
}
