//! Synchronous GPU to CPU readback helpers.
//!
//! The pipeline allows blocking readbacks in exactly three places: the welder's
//! one-shot bounds computation, the shrink-wrap cell counter, and the exporter's
//! slice copies. All of them funnel through here: copy into a `MAP_READ` staging
//! buffer, map it with an mpsc channel callback, poll the device until the map
//! completes, then copy the data out and unmap.

use std::time::Instant;

use bytemuck::Pod;

use crate::error::{BakeError, BakeResult};

/// Read `bytes` bytes from the front of `source` into a host vector.
///
/// `source` must carry `COPY_SRC` usage; `bytes` must be a multiple of 4.
pub fn read_buffer<T: Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    bytes: u64,
    label: &str,
) -> BakeResult<Vec<T>> {
    let start = Instant::now();

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, bytes);
    queue.submit(std::iter::once(encoder.finish()));

    let data = map_and_copy::<T>(device, &staging, label)?;

    log::debug!(
        "[Readback] {} bytes from '{}' in {:.2}ms",
        bytes,
        label,
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(data)
}

/// Read a full 2D `R32Float` texture into a host vector, row padding stripped.
///
/// Texture-to-buffer copies require `bytes_per_row` aligned to 256, so the
/// staging layout is padded and rows are compacted on the host afterwards.
pub fn read_texture_f32(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    label: &str,
) -> BakeResult<Vec<f32>> {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let unpadded_bytes_per_row = width * 4;
    let padded_bytes_per_row = (unpadded_bytes_per_row + align - 1) / align * align;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: padded_bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Slice Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let raw = map_and_copy::<u8>(device, &staging, label)?;

    let mut out = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        let start = (row * padded_bytes_per_row) as usize;
        let row_bytes = &raw[start..start + unpadded_bytes_per_row as usize];
        out.extend_from_slice(bytemuck::cast_slice(row_bytes));
    }
    Ok(out)
}

fn map_and_copy<T: Pod>(
    device: &wgpu::Device,
    staging: &wgpu::Buffer,
    label: &str,
) -> BakeResult<Vec<T>> {
    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    device.poll(wgpu::Maintain::Wait);

    receiver
        .recv()
        .map_err(|_| BakeError::Readback(format!("{label}: mapping callback dropped")))?
        .map_err(|e| BakeError::Readback(format!("{label}: {e:?}")))?;

    let mapped = slice.get_mapped_range();
    let data: Vec<T> = bytemuck::cast_slice(&mapped).to_vec();
    drop(mapped);
    staging.unmap();

    Ok(data)
}
