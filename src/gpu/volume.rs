//! 3D distance field volume textures.
//!
//! Every intermediate field (unsigned, ping/pong signed, shrink-wrapped) lives
//! in an `R32Float` 3D texture. `R32Float` is the scalar format WebGPU admits
//! for read/write storage access; the exported asset converts to half precision
//! at the very end of the pipeline.

use serde::{Deserialize, Serialize};

/// Voxel dimensions of a bake volume. Axes are sized independently, so
/// non-cubic volumes are the normal case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDims {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl VolumeDims {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Largest axis, which bounds sign propagation distance.
    pub fn max_dim(&self) -> u32 {
        self.width.max(self.height).max(self.depth)
    }

    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.depth,
        }
    }

    pub fn as_vec3(&self) -> glam::Vec3 {
        glam::Vec3::new(self.width as f32, self.height as f32, self.depth as f32)
    }
}

/// A GPU-resident scalar volume plus its default view.
pub struct DistanceVolume {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    dims: VolumeDims,
}

impl DistanceVolume {
    pub fn new(device: &wgpu::Device, dims: VolumeDims, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: dims.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        log::debug!(
            "[DistanceVolume] Created '{}' ({}x{}x{}, {} texels)",
            label,
            dims.width,
            dims.height,
            dims.depth,
            dims.texel_count()
        );

        Self {
            texture,
            view,
            dims,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn dims(&self) -> VolumeDims {
        self.dims
    }
}
