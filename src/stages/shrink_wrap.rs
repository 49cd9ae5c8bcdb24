//! Shrink wrap smoothing stage.
//!
//! Runs in two phases. Phase one sweeps the signed field and appends every
//! voxel within the expansion radius of the surface to a surface cell list,
//! counted with a device atomic. After the last sweep the count is read back
//! exactly once; phase two then re-evaluates every voxel against every cell,
//! 1024 cells and one layer slab per dispatch, with a running minimum kept in
//! the output volume. An empty cell list (always the case for a zero radius)
//! short-circuits the stage by copying the input volume through unchanged.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::error::{BakeError, BakeResult};
use crate::gpu::batching::div_round_up;
use crate::gpu::{readback, DistanceVolume, SliceBatches, VolumeDims};

/// Surface cell budget for a single recalculation dispatch. Matches the
/// batch walk hardcoded in the kernel.
const MAX_CELLS_PER_DISPATCH: u32 = 1024;

/// Bytes per surface cell on the GPU (position, distance, normal, pad).
const SURFACE_CELL_SIZE: u64 = 32;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ShrinkParams {
    dims: [u32; 3],
    pixel_size: f32,
    radius: f32,
    total_cell_count: u32,
    cell_offset: u32,
    layer_offset: u32,
}

pub struct ShrinkWrapStage {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    collect_pipeline: wgpu::ComputePipeline,
    recalculate_pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    params_buffer: wgpu::Buffer,
    count_buffer: wgpu::Buffer,
    input: DistanceVolume,
    output: DistanceVolume,
    batches: SliceBatches,
    dims: VolumeDims,
    pixel_size: f32,
    radius: f32,
    work_index: u32,
    // Read back once when phase one finishes; `Some(0)` means the stage
    // completed by copying the input through.
    cell_count: Option<u32>,
}

impl ShrinkWrapStage {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        input: DistanceVolume,
        radius: f32,
        pixel_size: f32,
    ) -> BakeResult<Self> {
        let dims = input.dims();
        let output = DistanceVolume::new(&device, dims, "Shrink Wrapped Field");
        let batches = SliceBatches::plan(dims);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shrink Wrap Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/shrink_wrap.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shrink Wrap Layout"),
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
                // Signed input field
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
                // Recalculated output, running minimum across cell batches
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
                // Surface cell list
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Surface cell counter
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shrink Wrap Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let collect_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Collect Surface Cells Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "collect_surface_cells",
        });
        let recalculate_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Recalculate Distance Pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: "recalculate_distance",
            });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shrink Wrap Params"),
            size: std::mem::size_of::<ShrinkParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Worst case every voxel is a surface cell.
        let cells_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Surface Cells"),
            size: dims.texel_count() * SURFACE_CELL_SIZE,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let count_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Surface Cell Count"),
            size: std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        queue.write_buffer(&count_buffer, 0, bytemuck::bytes_of(&0u32));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shrink Wrap Bind Group"),
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
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: cells_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: count_buffer.as_entire_binding(),
                },
            ],
        });

        log::info!(
            "[ShrinkWrap] Radius {} over {}x{}x{}",
            radius,
            dims.width,
            dims.height,
            dims.depth
        );

        Ok(Self {
            device,
            queue,
            collect_pipeline,
            recalculate_pipeline,
            bind_group,
            params_buffer,
            count_buffer,
            input,
            output,
            batches,
            dims,
            pixel_size,
            radius,
            work_index: 0,
            cell_count: None,
        })
    }

    /// Issue the next collection or recalculation dispatch. Returns true once
    /// every cell batch has been folded into every layer batch, or
    /// immediately after an empty collection.
    pub fn do_work(&mut self) -> BakeResult<bool> {
        let depth_batches = self.batches.batch_count();

        if self.work_index < depth_batches {
            self.write_params(0, 0, self.batches.layer_offset(self.work_index));
            self.dispatch(&self.collect_pipeline, "Collect Surface Cells Pass");
            self.work_index += 1;
            return Ok(false);
        }

        let cell_count = match self.cell_count {
            Some(0) => return Ok(true),
            Some(count) => count,
            None => {
                let counts: Vec<u32> = readback::read_buffer(
                    &self.device,
                    &self.queue,
                    &self.count_buffer,
                    std::mem::size_of::<u32>() as u64,
                    "surface cell count",
                )?;
                let count = counts.first().copied().ok_or_else(|| {
                    BakeError::Readback("surface cell count came back empty".into())
                })?;
                self.cell_count = Some(count);
                log::info!("[ShrinkWrap] Collected {} surface cells", count);

                if count == 0 {
                    self.copy_input_through();
                    return Ok(true);
                }
                count
            }
        };

        let cell_batches = div_round_up(cell_count, MAX_CELLS_PER_DISPATCH);
        let phase_index = self.work_index - depth_batches;
        let cell_batch = phase_index % cell_batches;
        let pixel_batch = phase_index / cell_batches;

        if pixel_batch >= depth_batches {
            return Ok(true);
        }

        self.write_params(
            cell_count,
            cell_batch * MAX_CELLS_PER_DISPATCH,
            self.batches.layer_offset(pixel_batch),
        );
        self.dispatch(&self.recalculate_pipeline, "Recalculate Distance Pass");
        self.work_index += 1;
        Ok(false)
    }

    /// Reports 0 until the surface cell count is known, because the total
    /// dispatch count cannot be computed before then.
    pub fn progress(&self) -> f32 {
        match self.cell_count {
            None => 0.0,
            Some(0) => 1.0,
            Some(count) => {
                let cell_batches = div_round_up(count, MAX_CELLS_PER_DISPATCH);
                let total = (cell_batches + 1) * self.batches.batch_count();
                (self.work_index as f32 / total as f32).min(1.0)
            }
        }
    }

    /// The smoothed field; valid once `do_work` has returned true.
    pub fn into_result(self) -> DistanceVolume {
        self.output
    }

    fn write_params(&self, total_cell_count: u32, cell_offset: u32, layer_offset: u32) {
        let params = ShrinkParams {
            dims: [self.dims.width, self.dims.height, self.dims.depth],
            pixel_size: self.pixel_size,
            radius: self.radius,
            total_cell_count,
            cell_offset,
            layer_offset,
        };
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
    }

    fn dispatch(&self, pipeline: &wgpu::ComputePipeline, label: &str) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Shrink Wrap Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            let (x, y, z) = self.batches.workgroups();
            pass.dispatch_workgroups(x, y, z);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn copy_input_through(&self) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Shrink Wrap Copy Encoder"),
            });
        encoder.copy_texture_to_texture(
            self.input.texture().as_image_copy(),
            self.output.texture().as_image_copy(),
            self.dims.extent(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        log::info!("[ShrinkWrap] No surface cells in radius, field passes through unchanged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shrink_params_match_shader_layout() {
        assert_eq!(std::mem::size_of::<ShrinkParams>(), 32);
    }

    #[test]
    fn cell_batches_round_up() {
        assert_eq!(div_round_up(1, MAX_CELLS_PER_DISPATCH), 1);
        assert_eq!(div_round_up(1024, MAX_CELLS_PER_DISPATCH), 1);
        assert_eq!(div_round_up(2049, MAX_CELLS_PER_DISPATCH), 3);
    }
}
