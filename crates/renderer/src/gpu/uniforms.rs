use bytemuck::{Pod, Zeroable};

use crate::engine::{FrameDescription, UniformValue};
use crate::shader::EFFECT_SLOTS;

/// std140 mirror of the `FrameParams` block.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct FrameBlock {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub inverse_view_projection: [[f32; 4]; 4],
    pub eye: [f32; 4],
    pub shading: [f32; 4],
    pub surface: [f32; 4],
    pub environment: [f32; 4],
    pub lights: [f32; 4],
    pub spot_position: [f32; 4],
    pub background: [f32; 4],
}

unsafe impl Zeroable for FrameBlock {}
unsafe impl Pod for FrameBlock {}

impl FrameBlock {
    /// `environment_lods` is the mip count of the bound environment, or `None`.
    pub fn new(frame: &FrameDescription, environment_lods: Option<u32>) -> Self {
        let uniforms = &frame.uniforms;
        let normal_matrix = frame.model.inverse().transpose();
        let inverse_view_projection = (frame.projection * frame.view).inverse();
        let (has_environment, max_lod) = match environment_lods {
            Some(levels) => (1.0, levels.saturating_sub(1) as f32),
            None => (0.0, 0.0),
        };
        Self {
            model: frame.model.to_cols_array_2d(),
            view: frame.view.to_cols_array_2d(),
            projection: frame.projection.to_cols_array_2d(),
            normal_matrix: normal_matrix.to_cols_array_2d(),
            inverse_view_projection: inverse_view_projection.to_cols_array_2d(),
            eye: frame.eye.extend(1.0).to_array(),
            shading: [
                uniforms.displacement_scale,
                uniforms.displacement_bias,
                uniforms.normal_scale,
                uniforms.roughness,
            ],
            surface: [
                uniforms.metalness,
                uniforms.uv_repeat[0],
                uniforms.uv_repeat[1],
                flag(uniforms.double_sided),
            ],
            environment: [
                uniforms.environment_intensity,
                flag(uniforms.show_background),
                has_environment,
                max_lod,
            ],
            lights: [
                uniforms.ambient_intensity,
                uniforms.spot_intensity,
                uniforms.spot_angle,
                uniforms.spot_penumbra,
            ],
            spot_position: uniforms.spot_position.extend(1.0).to_array(),
            background: [
                uniforms.background[0],
                uniforms.background[1],
                uniforms.background[2],
                1.0,
            ],
        }
    }

    pub fn draws_background(&self) -> bool {
        self.environment[1] > 0.5 && self.environment[2] > 0.5
    }
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// std140 mirror of the `EffectParams` block.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct EffectBlock {
    pub slots: [[f32; 4]; EFFECT_SLOTS],
}

unsafe impl Zeroable for EffectBlock {}
unsafe impl Pod for EffectBlock {}

impl EffectBlock {
    pub fn set(&mut self, slot: u32, value: UniformValue) -> bool {
        match self.slots.get_mut(slot as usize) {
            Some(entry) => {
                *entry = value.as_vec4();
                true
            }
            None => false,
        }
    }
}

const _: () = assert!(std::mem::size_of::<FrameBlock>() == 5 * 64 + 7 * 16);

/// A posed frame with every uniform set to a distinct value.
#[cfg(test)]
pub(crate) fn posed_frame() -> FrameDescription {
    use crate::engine::{FrameUniforms, MeshId, ProgramId};
    use crate::types::ContactShadow;
    use glam::{Mat4, Vec3};

    FrameDescription {
        mesh: MeshId(1),
        program: ProgramId(1),
        model: Mat4::from_rotation_y(0.5),
        view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO, Vec3::Y),
        projection: Mat4::perspective_rh(45f32.to_radians(), 1.5, 0.05, 100.0),
        eye: Vec3::new(0.0, 0.0, 4.0),
        material: [None; 5],
        environment: None,
        uniforms: FrameUniforms {
            displacement_scale: 0.2,
            displacement_bias: -0.1,
            normal_scale: 1.0,
            roughness: 0.7,
            metalness: 0.3,
            uv_repeat: [2.0, 3.0],
            double_sided: true,
            environment_intensity: 1.5,
            show_background: true,
            ambient_intensity: 0.5,
            spot_intensity: 1.0,
            spot_angle: 0.2,
            spot_penumbra: 0.8,
            spot_position: Vec3::splat(10.0),
            contact_shadow: ContactShadow::default(),
            background: [0.1, 0.2, 0.3],
        },
    }
}

#[cfg(test)]
mod tests {
    use glam::Mat4;

    use super::*;

    #[test]
    fn packs_frame_parameters() {
        let frame = posed_frame();
        let block = FrameBlock::new(&frame, Some(9));
        assert_eq!(block.shading, [0.2, -0.1, 1.0, 0.7]);
        assert_eq!(block.surface, [0.3, 2.0, 3.0, 1.0]);
        assert_eq!(block.environment, [1.5, 1.0, 1.0, 8.0]);
        assert!(block.draws_background());

        let product = Mat4::from_cols_array_2d(&block.normal_matrix).transpose()
            * Mat4::from_cols_array_2d(&block.model);
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn missing_environment_hides_background() {
        let block = FrameBlock::new(&posed_frame(), None);
        assert_eq!(block.environment[2], 0.0);
        assert!(!block.draws_background());
    }

    #[test]
    fn effect_slots_are_bounded() {
        let mut block = EffectBlock::default();
        assert!(block.set(1, UniformValue::Float(3.0)));
        assert_eq!(block.slots[1], [3.0, 0.0, 0.0, 0.0]);
        assert!(!block.set(EFFECT_SLOTS as u32, UniformValue::Float(1.0)));
    }
}
