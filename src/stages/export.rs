//! Export stage.
//!
//! Drains the finished volume to the CPU a few depth slices per call. Each
//! slice goes through a copy kernel into a 2D staging texture and a blocking
//! readback, the same path the other stages use for their one-off readbacks.
//! Once every slice is down, the collected floats are converted to half
//! precision and packed into a [`VolumeAsset`].

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use half::f16;

use crate::asset::VolumeAsset;
use crate::baker::SdfPlacement;
use crate::error::BakeResult;
use crate::gpu::batching::div_round_up;
use crate::gpu::{readback, DistanceVolume, VolumeDims};

/// Depth slices drained per `do_work` call.
const SLICES_PER_TICK: u32 = 8;

/// Workgroup edge of the slice copy kernel.
const COPY_GROUP_DIM: u32 = 16;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct SliceParams {
    dims: [u32; 3],
    depth_slice: u32,
}

pub struct ExportStage {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    params_buffer: wgpu::Buffer,
    slice_texture: wgpu::Texture,
    // The finished volume stays alive as the copy kernel input.
    _volume: DistanceVolume,
    placement: SdfPlacement,
    dims: VolumeDims,
    collected: Vec<f32>,
    slice_index: u32,
    asset: Option<VolumeAsset>,
}

impl ExportStage {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        volume: DistanceVolume,
        placement: SdfPlacement,
    ) -> BakeResult<Self> {
        let dims = volume.dims();

        let slice_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Export Slice"),
            size: wgpu::Extent3d {
                width: dims.width,
                height: dims.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let slice_view = slice_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Copy Volume Slice Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../shaders/copy_volume_slice.wgsl").into(),
            ),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Copy Volume Slice Layout"),
            entries: &[
                // Slice parameters
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
                // Finished volume
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
                // 2D staging slice
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::R32Float,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Copy Volume Slice Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Copy Volume Slice Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "copy_slice",
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Slice Params"),
            size: std::mem::size_of::<SliceParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Copy Volume Slice Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(volume.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&slice_view),
                },
            ],
        });

        let collected = Vec::with_capacity(dims.texel_count() as usize);

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group,
            params_buffer,
            slice_texture,
            _volume: volume,
            placement,
            dims,
            collected,
            slice_index: 0,
            asset: None,
        })
    }

    /// Drain up to [`SLICES_PER_TICK`] slices; on the call after the last
    /// slice, assemble the asset and return true.
    pub fn do_work(&mut self) -> BakeResult<bool> {
        if self.asset.is_some() {
            return Ok(true);
        }

        if self.slice_index >= self.dims.depth {
            let values: Vec<f16> = self
                .collected
                .drain(..)
                .map(f16::from_f32)
                .collect();
            self.asset = Some(VolumeAsset {
                dims: self.dims,
                lower_corner: self.placement.lower_corner,
                pixel_size: self.placement.pixel_size,
                values,
            });
            log::info!(
                "[Export] Assembled {}x{}x{} asset ({} texels)",
                self.dims.width,
                self.dims.height,
                self.dims.depth,
                self.dims.texel_count()
            );
            return Ok(true);
        }

        for _ in 0..SLICES_PER_TICK {
            if self.slice_index >= self.dims.depth {
                break;
            }

            let params = SliceParams {
                dims: [self.dims.width, self.dims.height, self.dims.depth],
                depth_slice: self.slice_index,
            };
            self.queue
                .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Export Slice Encoder"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Copy Volume Slice Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                pass.dispatch_workgroups(
                    div_round_up(self.dims.width, COPY_GROUP_DIM),
                    div_round_up(self.dims.height, COPY_GROUP_DIM),
                    1,
                );
            }
            self.queue.submit(std::iter::once(encoder.finish()));

            let slice = readback::read_texture_f32(
                &self.device,
                &self.queue,
                &self.slice_texture,
                self.dims.width,
                self.dims.height,
                "distance slice",
            )?;
            self.collected.extend_from_slice(&slice);
            self.slice_index += 1;
        }

        Ok(false)
    }

    pub fn progress(&self) -> f32 {
        self.slice_index as f32 / self.dims.depth as f32
    }

    /// The assembled asset; `None` until `do_work` has returned true.
    pub fn into_asset(self) -> Option<VolumeAsset> {
        self.asset
    }
}
