//! `wgpu` implementation of the render engine.
//!
//! - `context` owns instance, device and swapchain wiring.
//! - `textures` uploads prepared mip chains, provides placeholders for
//!   unbound slots and picks samplers by wrap mode.
//! - `pipeline` compiles composed GLSL into mesh, background and present
//!   pipelines over three bind groups (frame, material, effects).
//! - `uniforms` mirrors the std140 blocks the shaders declare.
//! - `shadow` renders the blurred contact shadow and its ground quad.
//! - `readback` copies the offscreen scene to tightly packed RGBA rows.
//! - `engine` ties it together as [`GpuEngine`].

mod context;
mod engine;
mod pipeline;
mod readback;
mod shadow;
mod textures;
mod uniforms;

pub use engine::GpuEngine;
