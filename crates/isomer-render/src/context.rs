use std::sync::Arc;

/// A globally shared graphics context.
///
/// Returned as `Arc<Self>` so the backend, texture loaders, and the app can
/// share it cheaply; dropping the last handle tears the device down.
pub struct GraphicsContext {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GraphicsContext {
    /// Creates a new graphics context, picking a high-performance adapter.
    pub async fn new() -> Arc<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to find a suitable GPU adapter");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("isomer_device"),
                ..Default::default()
            })
            .await
            .expect("Failed to create device");

        tracing::info!("Created graphics context on {}", adapter.get_info().name);

        Arc::new(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Creates a new graphics context synchronously.
    ///
    /// This blocks the current thread until the context is created.
    pub fn new_sync() -> Arc<Self> {
        pollster::block_on(Self::new())
    }

    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Adapter info for logging and diagnostics.
    pub fn info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }
}
