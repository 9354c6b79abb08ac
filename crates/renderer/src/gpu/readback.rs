use crate::engine::FrameReadback;
use crate::error::EngineError;

const BYTES_PER_TEXEL: u32 = 4;

/// Row pitch rounded up to the copy alignment.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * BYTES_PER_TEXEL).div_ceil(align) * align
}

/// Strips per-row padding from a mapped copy.
pub(crate) fn unpad_rows(padded: &[u8], width: u32, height: u32) -> Vec<u8> {
    let tight = (width * BYTES_PER_TEXEL) as usize;
    let pitch = padded_bytes_per_row(width) as usize;
    let mut rgba = Vec::with_capacity(tight * height as usize);
    for row in padded.chunks(pitch).take(height as usize) {
        rgba.extend_from_slice(&row[..tight]);
    }
    rgba
}

/// Copies an RGBA8 texture back to the CPU as tightly packed rows.
pub(crate) fn read_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<FrameReadback, EngineError> {
    let width = texture.width();
    let height = texture.height();
    let pitch = padded_bytes_per_row(width);
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("capture staging"),
        size: u64::from(pitch) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("capture encoder"),
    });
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
                bytes_per_row: Some(pitch),
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

    let slice = staging.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| EngineError::Readback(err.to_string()))?;
    receiver
        .recv()
        .map_err(|_| EngineError::Readback("map callback dropped".into()))?
        .map_err(|err| EngineError::Readback(err.to_string()))?;

    let rgba = {
        let mapped = slice.get_mapped_range();
        unpad_rows(&mapped, width, height)
    };
    staging.unmap();
    Ok(FrameReadback {
        width,
        height,
        rgba,
    })
}
