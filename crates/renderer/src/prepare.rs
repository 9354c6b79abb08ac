//! Turns decoded pixels into upload-ready mip chains.
//!
//! Runs on the decode worker right after decoding. Environment maps become
//! linear `Rgba16Float`; material maps stay 8-bit, sRGB-tagged only when the
//! layout asks for it.
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, Rgba32FImage, RgbaImage};

use crate::driver::srgb_to_linear;
use crate::engine::{DecodedImage, PixelData, PreparedTexture, TexelFormat, TextureLayout};
use crate::error::DecodeError;
use crate::types::ColorSpace;

/// Mip levels down to 1×1 for a `width`×`height` base.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

pub fn prepare(image: &DecodedImage, layout: TextureLayout) -> Result<PreparedTexture, DecodeError> {
    if image.texel_count() == 0 {
        return Err(DecodeError::Empty);
    }
    let (format, data, mip_levels) = if layout.mapping.is_environment() {
        let base = linear_float_image(image, layout.color_space)?;
        let (data, levels) = float_mip_chain(base);
        (TexelFormat::Rgba16Float, data, levels)
    } else {
        let base = unorm_image(image)?;
        let (data, levels) = unorm_mip_chain(base);
        let format = match layout.color_space {
            ColorSpace::Srgb => TexelFormat::Rgba8UnormSrgb,
            ColorSpace::Linear => TexelFormat::Rgba8Unorm,
        };
        (format, data, levels)
    };
    Ok(PreparedTexture {
        width: image.width,
        height: image.height,
        format,
        mip_levels,
        data,
    })
}

fn unorm_image(image: &DecodedImage) -> Result<RgbaImage, DecodeError> {
    let bytes = match &image.pixels {
        PixelData::Rgba8(bytes) => bytes.clone(),
        PixelData::RgbaF32(values) => values
            .iter()
            .map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect(),
    };
    RgbaImage::from_raw(image.width, image.height, bytes).ok_or_else(|| size_mismatch(image))
}

fn linear_float_image(
    image: &DecodedImage,
    color_space: ColorSpace,
) -> Result<Rgba32FImage, DecodeError> {
    let values = match &image.pixels {
        PixelData::RgbaF32(values) => values.clone(),
        PixelData::Rgba8(bytes) => bytes
            .chunks_exact(4)
            .flat_map(|texel| {
                let decode = |value: u8| match color_space {
                    ColorSpace::Srgb => srgb_to_linear(value),
                    ColorSpace::Linear => value as f32 / 255.0,
                };
                [
                    decode(texel[0]),
                    decode(texel[1]),
                    decode(texel[2]),
                    texel[3] as f32 / 255.0,
                ]
            })
            .collect(),
    };
    Rgba32FImage::from_raw(image.width, image.height, values).ok_or_else(|| size_mismatch(image))
}

fn size_mismatch(image: &DecodedImage) -> DecodeError {
    DecodeError::SizeMismatch {
        width: image.width,
        height: image.height,
    }
}

fn mip_chain<P>(base: ImageBuffer<P, Vec<P::Subpixel>>) -> Vec<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: image::Pixel + 'static,
    P::Subpixel: 'static,
{
    let levels = mip_level_count(base.width(), base.height());
    let mut chain = Vec::with_capacity(levels as usize);
    chain.push(base);
    for _ in 1..levels {
        let Some(previous) = chain.last() else { break };
        let width = (previous.width() / 2).max(1);
        let height = (previous.height() / 2).max(1);
        let next = imageops::resize(previous, width, height, FilterType::Triangle);
        chain.push(next);
    }
    chain
}

fn unorm_mip_chain(base: RgbaImage) -> (Vec<u8>, u32) {
    let chain = mip_chain::<Rgba<u8>>(base);
    let levels = chain.len() as u32;
    let data = chain.into_iter().flat_map(|level| level.into_raw()).collect();
    (data, levels)
}

fn float_mip_chain(base: Rgba32FImage) -> (Vec<u8>, u32) {
    let chain = mip_chain::<Rgba<f32>>(base);
    let levels = chain.len() as u32;
    let data = chain
        .iter()
        .flat_map(|level| level.as_raw().iter())
        .flat_map(|value| half::f16::from_f32(*value).to_bits().to_le_bytes())
        .collect();
    (data, levels)
}
