//! Renderer crate for pbrview, the PBR material previewer.
//!
//! The crate splits into a GPU-agnostic core and a `wgpu` backend:
//!
//! ```text
//!   UI (window / CLI)
//!          │ settings, channel sources, capture + export requests
//!          ▼
//!       Session ──▶ RenderLoopDriver::frame ──▶ RenderEngine::submit_frame
//!          │            │  poll decodes           ▲
//!          │            │  ensure program / mesh  │  GpuEngine (wgpu)
//!          │            └─ complete capture       │  FakeEngine (tests)
//!          ▼
//!   TextureBindingManager / EnvironmentSelector ◀── DecodeWorker threads
//! ```
//!
//! Image decoding and mip-chain building run off the frame loop; completions
//! are stamped with a per-slot generation and only the newest one is ever
//! installed. Program
//! variants are keyed by the set of bound material channels, while sliders
//! travel as uniforms and never trigger a recompile. Captures reconfigure the
//! surface density for exactly one frame and always restore it.

mod camera;
mod capture;
mod decode;
mod driver;
mod engine;
mod environment;
mod error;
mod geometry;
mod gpu;
mod prepare;
mod session;
mod shader;
mod textures;
mod types;
mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use camera::OrbitCamera;
pub use capture::{CaptureRequest, CaptureService, CaptureSink, DirectorySink};
pub use decode::{
    decode_radiance, decode_standard, DecodeCompletion, DecodeInput, DecodeQueue, DecodeRequest,
    DecodeWorker, InlineDecoder, Resolution, ThreadedDecoder,
};
pub use driver::{AutoRotation, FrameContext, FrameReport, RenderLoopDriver};
pub use engine::{
    DecodedImage, FrameDescription, FrameReadback, FrameUniforms, MeshId, PixelData,
    PreparedTexture, ProgramId, ProgramSource, RenderEngine, SurfaceMetrics, TexelFormat,
    TextureDescriptor, TextureId, TextureLayout, TextureMapping, UniformSlot, UniformValue,
    WrapMode,
};
pub use environment::{preset_panorama, ActiveEnvironment, EnvironmentPlan, EnvironmentSelector};
pub use error::{DecodeError, DecodeTarget, EngineError, ViewerError};
pub use geometry::{GeometryProvider, MeshData, MeshVertex};
pub use gpu::GpuEngine;
pub use prepare::{mip_level_count, prepare};
pub use session::Session;
pub use shader::{Anchor, ProgramTemplate, ShaderAugmentor, ShaderEffect, EFFECT_SLOTS, RIM_EFFECT};
pub use textures::{export_channels, ExportedChannel, TextureBindingManager};
pub use types::{
    CameraSettings, ChannelMask, ColorSpace, ContactShadow, EnvironmentMode, EnvironmentPreset,
    EnvironmentState, GeometryKind, HdrFormat, ImageSource, LightingRig, MaterialChannel,
    RimParameters, ShadingParameters, ViewerSettings, CHANNEL_COUNT,
};
pub use window::{
    apply_command, run_viewer, CaptureNames, CommandOutcome, MaterialExporter, ViewerCommand,
    ViewerOptions,
};
