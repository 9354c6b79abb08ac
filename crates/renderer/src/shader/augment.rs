use std::collections::HashMap;

use crate::engine::{ProgramId, RenderEngine, UniformValue};
use crate::error::ViewerError;
use crate::types::{ChannelMask, RimParameters};

use super::template::{ProgramTemplate, ShaderEffect};

/// View-dependent rim boost added to the final outgoing radiance.
///
/// Follows the silhouette of the mesh, so it reads the geometric normal and
/// ignores normal-map detail.
pub const RIM_EFFECT: ShaderEffect = ShaderEffect {
    name: "rim",
    uniforms: &["rim_strength", "rim_power"],
    declarations: "",
    radiance: "    outgoing_radiance += vec3(rim_strength * pow(1.0 - max(0.0, dot(geometry_normal, view_dir)), rim_power));",
};

/// Owns the compiled program variants and keeps their effect uniforms in sync.
///
/// A program is compiled once per channel feature set and cached; switching
/// back to a known feature set reuses it. Rim changes only rewrite uniforms.
pub struct ShaderAugmentor {
    template: ProgramTemplate,
    effects: Vec<ShaderEffect>,
    programs: HashMap<ChannelMask, ProgramId>,
    applied: HashMap<ProgramId, RimParameters>,
    active: Option<ProgramId>,
    structural_compiles: usize,
    uniform_updates: usize,
}

impl Default for ShaderAugmentor {
    fn default() -> Self {
        Self::new(ProgramTemplate::pbr())
    }
}

impl ShaderAugmentor {
    pub fn new(template: ProgramTemplate) -> Self {
        Self {
            template,
            effects: vec![RIM_EFFECT],
            programs: HashMap::new(),
            applied: HashMap::new(),
            active: None,
            structural_compiles: 0,
            uniform_updates: 0,
        }
    }

    /// Selects the program for `features`, compiling it on first use.
    pub fn ensure_program(
        &mut self,
        engine: &mut dyn RenderEngine,
        features: ChannelMask,
        rim: RimParameters,
    ) -> Result<ProgramId, ViewerError> {
        let program = match self.programs.get(&features) {
            Some(program) => *program,
            None => {
                let source = self.template.compose(features, &self.effects)?;
                let program = engine.compile_program(&source)?;
                self.structural_compiles += 1;
                tracing::info!(
                    label = %source.label,
                    compiles = self.structural_compiles,
                    "compiled shading program"
                );
                self.programs.insert(features, program);
                program
            }
        };
        self.active = Some(program);
        self.sync_rim(engine, rim)?;
        Ok(program)
    }

    /// Pushes rim coefficients into the active program if they changed.
    pub fn sync_rim(
        &mut self,
        engine: &mut dyn RenderEngine,
        rim: RimParameters,
    ) -> Result<bool, ViewerError> {
        let Some(program) = self.active else {
            return Ok(false);
        };
        if self.applied.get(&program) == Some(&rim) {
            return Ok(false);
        }
        engine.set_uniform(program, "rim_strength", UniformValue::Float(rim.strength))?;
        engine.set_uniform(program, "rim_power", UniformValue::Float(rim.power))?;
        self.applied.insert(program, rim);
        self.uniform_updates += 1;
        Ok(true)
    }

    pub fn active(&self) -> Option<ProgramId> {
        self.active
    }

    pub fn structural_compiles(&self) -> usize {
        self.structural_compiles
    }

    pub fn uniform_updates(&self) -> usize {
        self.uniform_updates
    }
}
