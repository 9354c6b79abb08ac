use crate::engine::{ProgramSource, UniformSlot};
use crate::error::EngineError;
use crate::types::ChannelMask;

use super::glsl::{ENVIRONMENT_BLOCK, FRAME_BLOCK, PBR_FRAGMENT, PBR_VERTEX};

/// Number of vec4 slots in the effect uniform block.
pub const EFFECT_SLOTS: usize = 4;

/// Stable insertion points in the base fragment program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Top level, after the built-in bindings.
    Declarations,
    /// Inside `main`, after the BRDF has produced `outgoing_radiance`.
    Radiance,
}

impl Anchor {
    pub fn marker(self) -> &'static str {
        match self {
            Anchor::Declarations => "// <insert:declarations>",
            Anchor::Radiance => "// <insert:radiance>",
        }
    }
}

/// An optional shading contribution: uniforms, declarations, and a radiance snippet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderEffect {
    pub name: &'static str,
    /// Scalar uniforms; each occupies the `.x` of its own effect slot.
    pub uniforms: &'static [&'static str],
    pub declarations: &'static str,
    pub radiance: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub struct ProgramTemplate {
    vertex: &'static str,
    fragment: &'static str,
}

impl Default for ProgramTemplate {
    fn default() -> Self {
        Self::pbr()
    }
}

impl ProgramTemplate {
    pub fn pbr() -> Self {
        Self {
            vertex: PBR_VERTEX,
            fragment: PBR_FRAGMENT,
        }
    }

    /// Builds the program variant for `features` with `effects` applied in order.
    ///
    /// Effects are deduplicated by name and each marker is consumed once, so
    /// composing the same inputs always yields identical source.
    pub fn compose(
        &self,
        features: ChannelMask,
        effects: &[ShaderEffect],
    ) -> Result<ProgramSource, EngineError> {
        let label = format!("pbr[{:05b}]", features.bits());
        let mut unique: Vec<&ShaderEffect> = Vec::new();
        for effect in effects {
            if !unique.iter().any(|seen| seen.name == effect.name) {
                unique.push(effect);
            }
        }

        let mut uniforms = Vec::new();
        let mut declarations = String::new();
        let mut radiance = String::new();
        for effect in &unique {
            declarations.push_str(&format!("// effect: {}\n", effect.name));
            for name in effect.uniforms {
                let slot = uniforms.len() as u32;
                if slot as usize >= EFFECT_SLOTS {
                    return Err(EngineError::Compile {
                        label,
                        message: format!("effect uniform '{name}' exceeds {EFFECT_SLOTS} slots"),
                    });
                }
                declarations.push_str(&format!("#define {name} effects.slots[{slot}].x\n"));
                uniforms.push(UniformSlot {
                    name: (*name).to_string(),
                    slot,
                });
            }
            declarations.push_str(effect.declarations);
            declarations.push('\n');
            radiance.push_str(&format!("    // effect: {}\n", effect.name));
            radiance.push_str(effect.radiance);
            radiance.push('\n');
        }

        let fragment = splice(self.fragment, Anchor::Declarations, &declarations, &label)?;
        let fragment = splice(&fragment, Anchor::Radiance, &radiance, &label)?;

        let defines: String = features
            .channels()
            .map(|channel| format!("#define {}\n", channel.define()))
            .collect();
        Ok(ProgramSource {
            vertex: format!("#version 450\n{defines}{FRAME_BLOCK}{}", self.vertex),
            fragment: format!("#version 450\n{defines}{FRAME_BLOCK}{ENVIRONMENT_BLOCK}{fragment}"),
            label,
            uniforms,
        })
    }
}

fn splice(source: &str, anchor: Anchor, insert: &str, label: &str) -> Result<String, EngineError> {
    let marker = anchor.marker();
    let Some(position) = source.find(marker) else {
        return Err(EngineError::Compile {
            label: label.to_string(),
            message: format!("template has no '{marker}' anchor"),
        });
    };
    let mut spliced = String::with_capacity(source.len() + insert.len());
    spliced.push_str(&source[..position]);
    spliced.push_str(insert);
    spliced.push_str(&source[position + marker.len()..]);
    Ok(spliced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::RIM_EFFECT;
    use crate::types::MaterialChannel;

    #[test]
    fn rim_term_lands_before_tone_mapping() {
        let source = ProgramTemplate::pbr()
            .compose(ChannelMask::empty(), &[RIM_EFFECT])
            .unwrap();
        let rim = source.fragment.find("rim_strength * pow").unwrap();
        let brdf = source.fragment.find("vec3 outgoing_radiance =").unwrap();
        let output = source.fragment.find("out_color = vec4(tone_map").unwrap();
        assert!(brdf < rim && rim < output);
        assert!(!source.fragment.contains("<insert:"));
        assert_eq!(source.slot_of("rim_strength"), Some(0));
        assert_eq!(source.slot_of("rim_power"), Some(1));
    }

    #[test]
    fn rim_reads_the_unmapped_normal() {
        let features = ChannelMask::empty().with(MaterialChannel::Normal);
        let source = ProgramTemplate::pbr()
            .compose(features, &[RIM_EFFECT])
            .unwrap();
        let fragment = &source.fragment;
        let captured = fragment.find("vec3 geometry_normal = normal;").unwrap();
        let perturbed = fragment.find("normal = perturb_normal(").unwrap();
        let rim = fragment.find("rim_strength * pow").unwrap();
        assert!(captured < perturbed && perturbed < rim);
        assert!(fragment.contains("dot(geometry_normal, view_dir)"));
    }

    #[test]
    fn composing_is_idempotent() {
        let template = ProgramTemplate::pbr();
        let once = template
            .compose(ChannelMask::empty(), &[RIM_EFFECT])
            .unwrap();
        let twice = template
            .compose(ChannelMask::empty(), &[RIM_EFFECT, RIM_EFFECT])
            .unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.fragment.matches("rim_strength * pow").count(), 1);
    }

    #[test]
    fn features_enable_defines_in_both_stages() {
        let features = ChannelMask::empty()
            .with(MaterialChannel::BaseColor)
            .with(MaterialChannel::Displacement);
        let source = ProgramTemplate::pbr().compose(features, &[]).unwrap();
        for stage in [&source.vertex, &source.fragment] {
            assert!(stage.starts_with("#version 450\n"));
            assert!(stage.contains("#define USE_BASECOLOR_MAP"));
            assert!(stage.contains("#define USE_DISPLACEMENT_MAP"));
            assert!(!stage.contains("#define USE_NORMAL_MAP"));
        }
    }

    #[test]
    fn missing_anchor_is_a_compile_error() {
        let template = ProgramTemplate {
            vertex: PBR_VERTEX,
            fragment: "void main() {}",
        };
        assert!(matches!(
            template.compose(ChannelMask::empty(), &[RIM_EFFECT]),
            Err(EngineError::Compile { .. })
        ));
    }
}
