//! Shading programs composed from a template with named insertion points.
mod augment;
pub(crate) mod glsl;
mod template;

pub use augment::{ShaderAugmentor, RIM_EFFECT};
pub use template::{Anchor, ProgramTemplate, ShaderEffect, EFFECT_SLOTS};
