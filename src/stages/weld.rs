//! Mesh welding stage.
//!
//! Flattens every enabled submesh of every enabled target renderer into one
//! contiguous triangle soup in bake space (world space re-rooted on the bake
//! origin). Vertices are de-indexed on the GPU, one thread per triangle, with
//! an atomic counter handing out output slots so draws from different
//! submeshes pack tightly. The single readback of the bake measures the welded
//! bounds, which the volume placement is derived from.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::error::{BakeError, BakeResult};
use crate::gpu::batching::div_round_up;
use crate::gpu::readback;
use crate::mesh::{MeshBounds, TargetRendererInfo};

/// Threads per workgroup of the weld kernel.
const WELD_GROUP_SIZE: u32 = 64;

/// Bytes per welded vertex (three packed f32 components).
const WELDED_VERTEX_SIZE: u64 = 12;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct WeldParams {
    transform: [[f32; 4]; 4],
    normal_transform: [[f32; 4]; 4],
    root_position: [f32; 3],
    expansion: f32,
    index_offset: u32,
    triangle_count: u32,
    _pad0: u32,
    _pad1: u32,
}

/// One dispatch covering a single enabled submesh. The bind group keeps the
/// per-renderer mesh buffers and the per-draw uniform alive.
struct WeldDraw {
    bind_group: wgpu::BindGroup,
    workgroup_count: u32,
}

pub struct WeldMeshStage {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::ComputePipeline,
    draws: Vec<WeldDraw>,
    welded_buffer: wgpu::Buffer,
    counter_buffer: wgpu::Buffer,
    vertex_count: u32,
    bounds: Option<MeshBounds>,
    done: bool,
}

impl WeldMeshStage {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        targets: &[TargetRendererInfo],
        root_position: Vec3,
    ) -> BakeResult<Self> {
        let mut total_index_count: u64 = 0;
        for target in targets.iter().filter(|t| t.enabled) {
            if target.submesh_enabled.len() != target.mesh.submesh_count() {
                return Err(BakeError::InvalidInput(format!(
                    "renderer '{}' has {} submesh toggles for {} submeshes",
                    target.mesh.name(),
                    target.submesh_enabled.len(),
                    target.mesh.submesh_count()
                )));
            }
            total_index_count += target.enabled_index_count();
        }

        if total_index_count < 3 {
            return Err(BakeError::InvalidInput(
                "no enabled triangles to bake".into(),
            ));
        }
        if total_index_count > u32::MAX as u64 {
            return Err(BakeError::InvalidInput(format!(
                "{} welded vertices exceed the u32 index range",
                total_index_count
            )));
        }
        let vertex_count = total_index_count as u32;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Weld Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/weld_mesh.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Weld Mesh Layout"),
            entries: &[
                // Draw parameters
                uniform_entry(0),
                // Mesh positions
                storage_entry(1, true),
                // Mesh normals
                storage_entry(2, true),
                // Mesh UVs
                storage_entry(3, true),
                // Mesh indices
                storage_entry(4, true),
                // Welded output vertices
                storage_entry(5, false),
                // Output slot counter
                storage_entry(6, false),
                // Expansion heightfield
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Heightfield sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 8,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Weld Mesh Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Weld Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "weld_mesh",
        });

        let welded_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Welded Vertices"),
            size: total_index_count * WELDED_VERTEX_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let counter_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Weld Vertex Counter"),
            contents: bytemuck::bytes_of(&0u32),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Heightfield Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        // Renderers without a heightfield sample a 1x1 full-strength texture,
        // so the kernel needs no separate path for plain expansion.
        let default_heightfield = upload_heightfield(&device, &queue, 1, 1, &[1.0]);

        let mut draws = Vec::new();
        for target in targets.iter().filter(|t| t.enabled) {
            let mesh = &target.mesh;

            let positions_buffer = upload_f32(
                &device,
                "Mesh Positions",
                &flatten_vec3(mesh.positions()),
            );
            let normals_buffer =
                upload_f32(&device, "Mesh Normals", &flatten_vec3(mesh.normals()));
            let uvs_buffer = upload_f32(&device, "Mesh UVs", &flatten_vec2(mesh.uvs()));
            let indices_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Indices"),
                contents: bytemuck::cast_slice(mesh.indices()),
                usage: wgpu::BufferUsages::STORAGE,
            });

            let heightfield_view = match &target.expansion_heightfield {
                Some(field) => {
                    let texture = upload_heightfield(
                        &device,
                        &queue,
                        field.width(),
                        field.height(),
                        field.samples(),
                    );
                    texture.create_view(&wgpu::TextureViewDescriptor::default())
                }
                None => default_heightfield.create_view(&wgpu::TextureViewDescriptor::default()),
            };

            let normal_transform = target.transform.inverse().transpose();

            for submesh_index in 0..mesh.submesh_count() {
                if !target.submesh_enabled[submesh_index] {
                    continue;
                }
                let submesh = mesh.submesh(submesh_index);
                let triangle_count = submesh.count / 3;
                if triangle_count == 0 {
                    continue;
                }

                let params = WeldParams {
                    transform: target.transform.to_cols_array_2d(),
                    normal_transform: normal_transform.to_cols_array_2d(),
                    root_position: root_position.to_array(),
                    expansion: target.expansion_distance,
                    index_offset: submesh.start,
                    triangle_count,
                    _pad0: 0,
                    _pad1: 0,
                };
                let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Weld Params"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                });

                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Weld Mesh Bind Group"),
                    layout: &bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: positions_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: normals_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: uvs_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: indices_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: welded_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 6,
                            resource: counter_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 7,
                            resource: wgpu::BindingResource::TextureView(&heightfield_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 8,
                            resource: wgpu::BindingResource::Sampler(&sampler),
                        },
                    ],
                });

                draws.push(WeldDraw {
                    bind_group,
                    workgroup_count: div_round_up(triangle_count, WELD_GROUP_SIZE),
                });
            }
        }

        log::info!(
            "[WeldMesh] Prepared {} draws covering {} triangles",
            draws.len(),
            vertex_count / 3
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            draws,
            welded_buffer,
            counter_buffer,
            vertex_count,
            bounds: None,
            done: false,
        })
    }

    /// Weld every draw and read the result back to measure its bounds.
    /// Completes in a single call.
    pub fn do_work(&mut self) -> BakeResult<bool> {
        if self.done {
            return Ok(true);
        }

        self.queue
            .write_buffer(&self.counter_buffer, 0, bytemuck::bytes_of(&0u32));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Weld Mesh Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Weld Mesh Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            for draw in &self.draws {
                pass.set_bind_group(0, &draw.bind_group, &[]);
                pass.dispatch_workgroups(draw.workgroup_count, 1, 1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        let welded: Vec<f32> = readback::read_buffer(
            &self.device,
            &self.queue,
            &self.welded_buffer,
            self.vertex_count as u64 * WELDED_VERTEX_SIZE,
            "welded vertices",
        )?;

        let points = welded
            .chunks_exact(3)
            .map(|v| Vec3::new(v[0], v[1], v[2]));
        self.bounds = MeshBounds::from_points(points);

        if let Some(bounds) = self.bounds {
            log::info!(
                "[WeldMesh] Welded bounds min {:?} max {:?}",
                bounds.min,
                bounds.max
            );
        }

        self.done = true;
        Ok(true)
    }

    pub fn triangle_count(&self) -> u32 {
        self.vertex_count / 3
    }

    pub fn bounds(&self) -> Option<MeshBounds> {
        self.bounds
    }

    /// Hand the welded soup and its bounds to the distance stage.
    pub fn into_parts(self) -> BakeResult<(wgpu::Buffer, u32, MeshBounds)> {
        let bounds = self.bounds.ok_or_else(|| {
            BakeError::InvalidInput("mesh welding has not completed".into())
        })?;
        Ok((self.welded_buffer, self.vertex_count / 3, bounds))
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn upload_f32(device: &wgpu::Device, label: &str, values: &[f32]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(values),
        usage: wgpu::BufferUsages::STORAGE,
    })
}

fn flatten_vec3(values: &[Vec3]) -> Vec<f32> {
    values.iter().flat_map(|v| [v.x, v.y, v.z]).collect()
}

fn flatten_vec2(values: &[glam::Vec2]) -> Vec<f32> {
    values.iter().flat_map(|v| [v.x, v.y]).collect()
}

fn upload_heightfield(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
    samples: &[f32],
) -> wgpu::Texture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Expansion Heightfield"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(samples),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    texture
}
