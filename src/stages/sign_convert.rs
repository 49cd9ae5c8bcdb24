//! Sign resolution stage.
//!
//! Turns the unsigned field into a signed one by flooding "outside" in from
//! the volume boundary, one voxel of frontier per pass, ping-ponging between
//! two scratch volumes. The pass count is fixed at twice the largest volume
//! axis, which runs the flood to its fixed point for any geometry the padded
//! volume can hold; extra passes are no-ops because the flip rule only ever
//! turns inside voxels outside. The flood needs padding between mesh and
//! volume boundary, which the placement guarantees for any positive padding.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::error::BakeResult;
use crate::gpu::{DistanceVolume, SliceBatches, VolumeDims};

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct SignParams {
    dims: [u32; 3],
    pixel_size: f32,
    layer_offset: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

pub struct SignConvertStage {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    seed_pipeline: wgpu::ComputePipeline,
    propagate_pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
    // Pass 0 reads the unsigned input; later passes alternate pong/ping.
    seed_bind_group: wgpu::BindGroup,
    even_bind_group: wgpu::BindGroup,
    odd_bind_group: wgpu::BindGroup,
    // The unsigned volume stays alive as the seed pass input.
    _unsigned: DistanceVolume,
    ping: DistanceVolume,
    _pong: DistanceVolume,
    batches: SliceBatches,
    dims: VolumeDims,
    pixel_size: f32,
    total_dispatches: u32,
    work_index: u32,
}

impl SignConvertStage {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        unsigned: DistanceVolume,
        pixel_size: f32,
    ) -> BakeResult<Self> {
        let dims = unsigned.dims();
        let ping = DistanceVolume::new(&device, dims, "Sign Ping");
        let pong = DistanceVolume::new(&device, dims, "Sign Pong");
        let batches = SliceBatches::plan(dims);

        // An even pass count leaves the final result in ping.
        let total_passes = 2 * dims.max_dim();
        let total_dispatches = total_passes * batches.batch_count();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sign Convert Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/sign_convert.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sign Convert Layout"),
            entries: &[
                // Pass parameters
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
                // Previous pass (or unsigned input)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::ReadOnly,
                        format: wgpu::TextureFormat::R32Float,
                        view_dimension: wgpu::TextureViewDimension::D3,
                    },
                    count: None,
                },
                // Next pass output
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::R32Float,
                        view_dimension: wgpu::TextureViewDimension::D3,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sign Convert Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let seed_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Sign Seed Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "seed_sign",
        });
        let propagate_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Sign Propagate Pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: "propagate_sign",
            });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sign Params"),
            size: std::mem::size_of::<SignParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let make_bind_group = |label, input: &DistanceVolume, output: &DistanceVolume| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(input.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(output.view()),
                    },
                ],
            })
        };

        let seed_bind_group = make_bind_group("Sign Seed Bind Group", &unsigned, &pong);
        let even_bind_group = make_bind_group("Sign Even Bind Group", &ping, &pong);
        let odd_bind_group = make_bind_group("Sign Odd Bind Group", &pong, &ping);

        log::info!(
            "[SignConvert] {} passes over {}x{}x{} ({} dispatches)",
            total_passes,
            dims.width,
            dims.height,
            dims.depth,
            total_dispatches
        );

        Ok(Self {
            device,
            queue,
            seed_pipeline,
            propagate_pipeline,
            params_buffer,
            seed_bind_group,
            even_bind_group,
            odd_bind_group,
            _unsigned: unsigned,
            ping,
            _pong: pong,
            batches,
            dims,
            pixel_size,
            total_dispatches,
            work_index: 0,
        })
    }

    /// Issue the next flood dispatch. Returns true once every pass has
    /// covered every layer batch.
    pub fn do_work(&mut self) -> BakeResult<bool> {
        if self.work_index >= self.total_dispatches {
            return Ok(true);
        }

        let depth_batches = self.batches.batch_count();
        let pass_index = self.work_index / depth_batches;
        let pixel_batch = self.work_index % depth_batches;

        let params = SignParams {
            dims: [self.dims.width, self.dims.height, self.dims.depth],
            pixel_size: self.pixel_size,
            layer_offset: self.batches.layer_offset(pixel_batch),
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let (pipeline, bind_group) = if pass_index == 0 {
            (&self.seed_pipeline, &self.seed_bind_group)
        } else if pass_index % 2 == 0 {
            (&self.propagate_pipeline, &self.even_bind_group)
        } else {
            (&self.propagate_pipeline, &self.odd_bind_group)
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sign Convert Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Sign Flood Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
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

    /// The signed field; valid once `do_work` has returned true.
    pub fn into_result(self) -> DistanceVolume {
        self.ping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_params_match_shader_layout() {
        assert_eq!(std::mem::size_of::<SignParams>(), 32);
    }
}
