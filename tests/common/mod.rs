//! Headless GPU helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::mpsc;
use std::time::{Duration, Instant};

use fluid_surface::{
    Camera, GpuContext, Particle, ParticleBatch, SurfaceConfig, SurfaceReconstruction,
    create_particle_buffer,
};

pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A headless device, or `None` when the machine has no adapter.
pub fn gpu() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

/// Pipeline with camera at (0, 0, 5) looking down -Z and unit-radius particles.
pub fn reconstruction(gpu: &GpuContext, width: u32, height: u32) -> SurfaceReconstruction {
    let config = SurfaceConfig::new()
        .target_format(TARGET_FORMAT)
        .particle_radius(1.0);
    let mut fluid = SurfaceReconstruction::new(gpu, config).expect("pipeline builds");
    fluid
        .set_camera(gpu, &Camera::default(), width as f32 / height as f32)
        .expect("camera uniforms");
    fluid
}

pub fn particles(gpu: &GpuContext, particles: &[Particle]) -> wgpu::Buffer {
    // Keep at least one record so the buffer is never zero-sized.
    let fallback = [Particle::default()];
    let contents = if particles.is_empty() { &fallback[..] } else { particles };
    create_particle_buffer(gpu, "Test Particles", contents)
}

/// A destination texture cleared to `color`.
pub fn destination(
    gpu: &GpuContext,
    width: u32,
    height: u32,
    color: wgpu::Color,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Test Destination"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    drop(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Clear Destination"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    }));
    gpu.queue.submit(Some(encoder.finish()));

    (texture, view)
}

/// Record and submit one frame.
pub fn render_frame(
    gpu: &GpuContext,
    fluid: &mut SurfaceReconstruction,
    target: &wgpu::TextureView,
    buffer: &wgpu::Buffer,
    count: u32,
    width: u32,
    height: u32,
) -> Result<(), fluid_surface::SurfaceError> {
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Frame"),
        });
    fluid.render(
        gpu,
        &mut encoder,
        target,
        &ParticleBatch::new(buffer, count),
        width,
        height,
    )?;
    gpu.queue.submit(Some(encoder.finish()));
    Ok(())
}

/// Copy a whole texture to the CPU, rows tightly packed.
pub fn read_texture(gpu: &GpuContext, texture: &wgpu::Texture, bytes_per_pixel: u32) -> Vec<u8> {
    let width = texture.width();
    let height = texture.height();
    let unpadded = width * bytes_per_pixel;
    let padded = unpadded.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback"),
        size: (padded * height) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        texture.size(),
    );
    gpu.queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let _ = gpu.device.poll(wgpu::PollType::Poll);
        if let Ok(result) = rx.try_recv() {
            result.expect("readback buffer maps");
            break;
        }
        assert!(Instant::now() < deadline, "timed out waiting for readback");
        std::thread::yield_now();
    }

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((unpadded * height) as usize);
    for row in mapped.chunks(padded as usize) {
        pixels.extend_from_slice(&row[..unpadded as usize]);
    }
    drop(mapped);
    staging.unmap();
    pixels
}

pub fn read_r32(gpu: &GpuContext, texture: &wgpu::Texture) -> Vec<f32> {
    read_texture(gpu, texture, 4)
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn read_r16(gpu: &GpuContext, texture: &wgpu::Texture) -> Vec<f32> {
    read_texture(gpu, texture, 2)
        .chunks_exact(2)
        .map(|c| f16_to_f32(u16::from_le_bytes([c[0], c[1]])))
        .collect()
}

pub fn read_rgba8(gpu: &GpuContext, texture: &wgpu::Texture) -> Vec<[u8; 4]> {
    read_texture(gpu, texture, 4)
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect()
}

/// Fill an R32Float texture with one value.
pub fn fill_r32(gpu: &GpuContext, texture: &wgpu::Texture, value: f32) {
    let count = (texture.width() * texture.height()) as usize;
    let data: Vec<u8> = std::iter::repeat_n(value.to_le_bytes(), count)
        .flatten()
        .collect();
    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(texture.width() * 4),
            rows_per_image: Some(texture.height()),
        },
        texture.size(),
    );
}

fn f16_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let mantissa = (bits & 0x3ff) as f32;
    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        0x1f if mantissa == 0.0 => sign * f32::INFINITY,
        0x1f => f32::NAN,
        _ => sign * (1.0 + mantissa / 1024.0) * 2f32.powi(exponent - 15),
    }
}

pub fn at(values: &[f32], width: u32, x: u32, y: u32) -> f32 {
    values[(y * width + x) as usize]
}
