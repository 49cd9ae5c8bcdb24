//! Unsigned distance stage.
//!
//! Evaluates the exact point-to-triangle distance from every voxel sample to
//! every welded triangle, a brute force O(voxels x triangles) sweep kept
//! responsive by splitting the work both ways: at most 1024 triangles and one
//! bounded slab of z layers per dispatch. Triangle batches form the outer
//! loop so each dispatch folds its partial minimum into the stored field.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::baker::SdfPlacement;
use crate::error::{BakeError, BakeResult};
use crate::gpu::batching::div_round_up;
use crate::gpu::{DistanceVolume, SliceBatches, VolumeDims};

/// Triangle budget for a single dispatch.
const MAX_TRIANGLES_PER_DISPATCH: u32 = 1024;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct DistanceParams {
    min_corner: [f32; 3],
    pixel_size: f32,
    dims: [u32; 3],
    triangle_count: u32,
    triangle_offset: u32,
    layer_offset: u32,
    _pad0: u32,
    _pad1: u32,
}

pub struct BruteForceDistanceStage {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    params_buffer: wgpu::Buffer,
    output: DistanceVolume,
    batches: SliceBatches,
    dims: VolumeDims,
    min_corner: glam::Vec3,
    pixel_size: f32,
    triangle_count: u32,
    total_dispatches: u32,
    work_index: u32,
}

impl BruteForceDistanceStage {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        welded_buffer: wgpu::Buffer,
        triangle_count: u32,
        placement: &SdfPlacement,
    ) -> BakeResult<Self> {
        if triangle_count == 0 {
            return Err(BakeError::InvalidInput(
                "distance pass needs at least one triangle".into(),
            ));
        }

        let dims = placement.dims;
        let output = DistanceVolume::new(&device, dims, "Unsigned Distance Field");
        let batches = SliceBatches::plan(dims);
        let triangle_batches = div_round_up(triangle_count, MAX_TRIANGLES_PER_DISPATCH);
        let total_dispatches = triangle_batches * batches.batch_count();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Brute Force Distance Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../shaders/brute_force_distance.wgsl").into(),
            ),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Brute Force Distance Layout"),
            entries: &[
                // Dispatch parameters
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Welded triangle soup
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Accumulated unsigned field
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::ReadWrite,
                        format: wgpu::TextureFormat::R32Float,
                        view_dimension: wgpu::TextureViewDimension::D3,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Brute Force Distance Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Brute Force Distance Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "unsigned_distance",
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Distance Params"),
            size: std::mem::size_of::<DistanceParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Brute Force Distance Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: welded_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(output.view()),
                },
            ],
        });

        log::info!(
            "[BruteForceDistance] {}x{}x{} field, {} triangles, {} dispatches",
            dims.width,
            dims.height,
            dims.depth,
            triangle_count,
            total_dispatches
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group,
            params_buffer,
            output,
            batches,
            dims,
            min_corner: placement.lower_corner,
            pixel_size: placement.pixel_size,
            triangle_count,
            total_dispatches,
            work_index: 0,
        })
    }

    /// Issue the next bounded dispatch. Returns true once every triangle
    /// batch has been folded into every layer batch.
    pub fn do_work(&mut self) -> BakeResult<bool> {
        if self.work_index >= self.total_dispatches {
            return Ok(true);
        }

        let depth_batches = self.batches.batch_count();
        let triangle_batch = self.work_index / depth_batches;
        let pixel_batch = self.work_index % depth_batches;

        let triangle_offset = triangle_batch * MAX_TRIANGLES_PER_DISPATCH;
        let params = DistanceParams {
            min_corner: self.min_corner.to_array(),
            pixel_size: self.pixel_size,
            dims: [self.dims.width, self.dims.height, self.dims.depth],
            triangle_count: (self.triangle_count - triangle_offset)
                .min(MAX_TRIANGLES_PER_DISPATCH),
            triangle_offset,
            layer_offset: self.batches.layer_offset(pixel_batch),
            _pad0: 0,
            _pad1: 0,
        };
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Brute Force Distance Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Unsigned Distance Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            let (x, y, z) = self.batches.workgroups();
            pass.dispatch_workgroups(x, y, z);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        self.work_index += 1;
        Ok(false)
    }

    pub fn progress(&self) -> f32 {
        self.work_index as f32 / self.total_dispatches as f32
    }

    pub fn into_output(self) -> DistanceVolume {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_params_match_shader_layout() {
        assert_eq!(std::mem::size_of::<DistanceParams>(), 48);
    }

    #[test]
    fn triangle_batches_round_up() {
        assert_eq!(div_round_up(1, MAX_TRIANGLES_PER_DISPATCH), 1);
        assert_eq!(div_round_up(1024, MAX_TRIANGLES_PER_DISPATCH), 1);
        assert_eq!(div_round_up(1025, MAX_TRIANGLES_PER_DISPATCH), 2);
    }
}
