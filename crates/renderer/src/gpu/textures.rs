use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::engine::{PreparedTexture, TexelFormat, TextureDescriptor, WrapMode};
use crate::error::EngineError;

pub(crate) struct GpuTexture {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub mip_levels: u32,
    pub wrap: WrapMode,
}

pub(crate) fn texture_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TexelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TexelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

/// Checks a prepared chain against the device before anything is allocated.
pub(crate) fn validate(
    prepared: &PreparedTexture,
    label: &str,
    max_dimension: u32,
) -> Result<(), EngineError> {
    if prepared.width == 0 || prepared.height == 0 || prepared.mip_levels == 0 {
        return Err(EngineError::Upload(format!("{label} is empty")));
    }
    if prepared.width > max_dimension || prepared.height > max_dimension {
        return Err(EngineError::Upload(format!(
            "{label} is {}x{}, larger than the GPU limit of {max_dimension}",
            prepared.width, prepared.height
        )));
    }
    if prepared.data.len() != prepared.expected_len() {
        return Err(EngineError::Upload(format!(
            "{label} carries {} bytes, expected {} for {} mip levels",
            prepared.data.len(),
            prepared.expected_len(),
            prepared.mip_levels
        )));
    }
    Ok(())
}

/// Copies a prepared mip chain into a new texture.
pub(crate) fn upload(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    prepared: &PreparedTexture,
    descriptor: &TextureDescriptor,
    max_dimension: u32,
) -> Result<GpuTexture, EngineError> {
    validate(prepared, &descriptor.label, max_dimension)?;
    let format = texture_format(prepared.format);
    let mip_levels = prepared.mip_levels;

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&descriptor.label),
            size: wgpu::Extent3d {
                width: prepared.width,
                height: prepared.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &prepared.data,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    tracing::debug!(
        label = %descriptor.label,
        width = prepared.width,
        height = prepared.height,
        mip_levels,
        ?format,
        "texture uploaded"
    );
    Ok(GpuTexture {
        _texture: texture,
        view,
        mip_levels,
        wrap: descriptor.wrap,
    })
}

/// 1×1 texture bound where a slot has nothing loaded.
pub(crate) fn placeholder(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    format: wgpu::TextureFormat,
    wrap: WrapMode,
) -> GpuTexture {
    let data: Vec<u8> = match format {
        wgpu::TextureFormat::Rgba16Float => [0.0f32, 0.0, 0.0, 1.0]
            .iter()
            .flat_map(|value| half::f16::from_f32(*value).to_bits().to_le_bytes())
            .collect(),
        _ => vec![255, 255, 255, 255],
    };
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        _texture: texture,
        view,
        mip_levels: 1,
        wrap,
    }
}

/// (U, V) address modes for a wrap mode.
pub(crate) fn address_modes(wrap: WrapMode) -> (wgpu::AddressMode, wgpu::AddressMode) {
    match wrap {
        WrapMode::Repeat => (wgpu::AddressMode::Repeat, wgpu::AddressMode::Repeat),
        WrapMode::Panorama => (wgpu::AddressMode::Repeat, wgpu::AddressMode::ClampToEdge),
    }
}

/// One sampler per [`WrapMode`], picked by the wrap of the bound texture.
pub(crate) struct Samplers {
    repeat: wgpu::Sampler,
    panorama: wgpu::Sampler,
}

impl Samplers {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            repeat: create_sampler(device, WrapMode::Repeat),
            panorama: create_sampler(device, WrapMode::Panorama),
        }
    }

    pub fn get(&self, wrap: WrapMode) -> &wgpu::Sampler {
        match wrap {
            WrapMode::Repeat => &self.repeat,
            WrapMode::Panorama => &self.panorama,
        }
    }
}

fn create_sampler(device: &wgpu::Device, wrap: WrapMode) -> wgpu::Sampler {
    let (address_mode_u, address_mode_v) = address_modes(wrap);
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(match wrap {
            WrapMode::Repeat => "repeat sampler",
            WrapMode::Panorama => "panorama sampler",
        }),
        address_mode_u,
        address_mode_v,
        address_mode_w: address_mode_v,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        anisotropy_clamp: 8,
        ..Default::default()
    })
}

/// Wrap shared by the material slot sampler: the first bound map decides.
pub(crate) fn material_wrap(bound: impl IntoIterator<Item = WrapMode>) -> WrapMode {
    bound.into_iter().next().unwrap_or(WrapMode::Repeat)
}
