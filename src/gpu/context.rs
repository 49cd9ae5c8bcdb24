//! Headless GPU device acquisition.
//!
//! The baker runs entirely on compute passes, so no surface or window is
//! involved. Default limits are sufficient: every kernel in this crate stays
//! within 256 invocations per workgroup and binds at most two storage textures.

use std::sync::Arc;

use crate::error::{BakeError, BakeResult};

/// Shared device/queue handles for the bake pipeline.
///
/// Stage helpers clone the `Arc`s they need; the context itself is owned by the
/// scheduler for the lifetime of the baker.
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Acquire an adapter and device, blocking on the async request.
    pub fn new() -> BakeResult<Self> {
        pollster::block_on(Self::new_async())
    }

    /// Async variant of [`GpuContext::new`] for callers that already run an
    /// executor.
    pub async fn new_async() -> BakeResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
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
            .ok_or(BakeError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        log::info!(
            "[GpuContext] Using adapter: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("SDF Baker Device"),
                    // Read-only and read-write storage texture bindings are
                    // native-only in wgpu 0.19 and sit behind this feature.
                    required_features: wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES,
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }
}
