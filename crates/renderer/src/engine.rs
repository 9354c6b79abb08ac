//! The boundary between viewer logic and the GPU.
//!
//! Everything above this trait (texture bindings, environment selection,
//! program augmentation, capture, the frame loop) talks to an abstract
//! [`RenderEngine`]. The wgpu backend in [`crate::gpu`] is the production
//! implementation; tests drive the same logic through a recording fake.
use glam::{Mat4, Vec3};

use crate::error::EngineError;
use crate::geometry::MeshData;
use crate::types::{ColorSpace, ContactShadow, CHANNEL_COUNT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

/// How a texture is addressed when sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureMapping {
    /// Ordinary material map sampled with mesh UVs.
    Uv,
    /// LDR panorama lit through the standard environment path.
    Equirectangular,
    /// Radiance panorama used as a reflection light probe.
    EquirectangularReflection,
}

impl TextureMapping {
    pub fn is_environment(self) -> bool {
        !matches!(self, TextureMapping::Uv)
    }
}

/// Address modes a texture is sampled with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WrapMode {
    /// Tiles in both directions.
    Repeat,
    /// Wraps around the horizon and clamps at the poles.
    Panorama,
}

/// Decode-time choices that fix a texture's texel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureLayout {
    pub color_space: ColorSpace,
    pub mapping: TextureMapping,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureDescriptor {
    pub label: String,
    pub color_space: ColorSpace,
    pub wrap: WrapMode,
    pub mapping: TextureMapping,
}

/// Pixel payload produced by the decoders.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelData {
    /// Four bytes per texel.
    Rgba8(Vec<u8>),
    /// Four floats per texel, linear radiance.
    RgbaF32(Vec<f32>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: PixelData,
}

impl DecodedImage {
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TexelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    /// Linear radiance, little-endian half floats.
    Rgba16Float,
}

impl TexelFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TexelFormat::Rgba8Unorm | TexelFormat::Rgba8UnormSrgb => 4,
            TexelFormat::Rgba16Float => 8,
        }
    }
}

/// A decoded image with its full mip chain packed level after level.
///
/// Built on the decode worker so the frame loop only copies bytes to the GPU.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedTexture {
    pub width: u32,
    pub height: u32,
    pub format: TexelFormat,
    pub mip_levels: u32,
    pub data: Vec<u8>,
}

impl PreparedTexture {
    /// Byte length a complete chain of `mip_levels` levels must have.
    pub fn expected_len(&self) -> usize {
        let texels: usize = (0..self.mip_levels)
            .map(|level| {
                let width = (self.width >> level).max(1) as usize;
                let height = (self.height >> level).max(1) as usize;
                width * height
            })
            .sum();
        texels * self.format.bytes_per_texel()
    }
}

/// Logical size of the drawing surface plus its device-pixel ratio.
///
/// The backing store is `logical × pixel_density` pixels; page layout only
/// ever sees the logical size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceMetrics {
    pub logical_width: u32,
    pub logical_height: u32,
    pub pixel_density: f32,
}

impl SurfaceMetrics {
    pub fn new(logical_width: u32, logical_height: u32, pixel_density: f32) -> Self {
        Self {
            logical_width,
            logical_height,
            pixel_density,
        }
    }

    pub fn with_density(self, pixel_density: f32) -> Self {
        Self {
            pixel_density,
            ..self
        }
    }

    /// Backing-store size in physical pixels, never zero.
    pub fn backing_size(&self) -> (u32, u32) {
        let scale = |logical: u32| ((logical as f32 * self.pixel_density).round() as u32).max(1);
        (scale(self.logical_width), scale(self.logical_height))
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.logical_width.max(1) as f32 / self.logical_height.max(1) as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    pub(crate) fn as_vec4(self) -> [f32; 4] {
        match self {
            UniformValue::Float(x) => [x, 0.0, 0.0, 0.0],
            UniformValue::Vec2([x, y]) => [x, y, 0.0, 0.0],
            UniformValue::Vec3([x, y, z]) => [x, y, z, 0.0],
            UniformValue::Vec4(v) => v,
        }
    }
}

/// Named effect uniform living in one slot of the program's effect block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: String,
    pub slot: u32,
}

/// Complete GLSL source of one shading program variant.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramSource {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
    pub uniforms: Vec<UniformSlot>,
}

impl ProgramSource {
    pub fn slot_of(&self, name: &str) -> Option<u32> {
        self.uniforms
            .iter()
            .find(|uniform| uniform.name == name)
            .map(|uniform| uniform.slot)
    }
}

/// Per-frame shading inputs shared by every program variant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameUniforms {
    pub displacement_scale: f32,
    pub displacement_bias: f32,
    pub normal_scale: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub uv_repeat: [f32; 2],
    pub double_sided: bool,
    pub environment_intensity: f32,
    pub show_background: bool,
    pub ambient_intensity: f32,
    pub spot_intensity: f32,
    pub spot_angle: f32,
    pub spot_penumbra: f32,
    pub spot_position: Vec3,
    pub contact_shadow: ContactShadow,
    /// Linear clear colour.
    pub background: [f32; 3],
}

/// Everything the engine needs to draw one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameDescription {
    pub mesh: MeshId,
    pub program: ProgramId,
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub eye: Vec3,
    pub material: [Option<TextureId>; CHANNEL_COUNT],
    pub environment: Option<TextureId>,
    pub uniforms: FrameUniforms,
}

/// Tightly packed RGBA8 pixels of the last presented frame, top row first.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReadback {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub trait RenderEngine {
    fn create_mesh(&mut self, mesh: &MeshData) -> Result<MeshId, EngineError>;
    fn destroy_mesh(&mut self, mesh: MeshId);

    /// Uploads a prepared texture as-is; no mip levels are built here.
    fn create_texture(
        &mut self,
        texture: &PreparedTexture,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureId, EngineError>;
    fn destroy_texture(&mut self, texture: TextureId);

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, EngineError>;
    fn set_uniform(
        &mut self,
        program: ProgramId,
        name: &str,
        value: UniformValue,
    ) -> Result<(), EngineError>;

    fn surface_metrics(&self) -> SurfaceMetrics;
    fn configure_surface(&mut self, metrics: SurfaceMetrics) -> Result<(), EngineError>;

    fn submit_frame(&mut self, frame: &FrameDescription) -> Result<(), EngineError>;
    fn read_pixels(&mut self) -> Result<FrameReadback, EngineError>;
}
