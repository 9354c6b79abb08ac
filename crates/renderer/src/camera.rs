use glam::{Mat4, Vec3};

use crate::types::CameraSettings;

const MIN_DISTANCE: f32 = 1.5;
const MAX_DISTANCE: f32 = 20.0;
const PITCH_LIMIT: f32 = 1.5;
const NEAR_PLANE: f32 = 0.05;
const FAR_PLANE: f32 = 100.0;

/// Orbit camera looking at the origin. Starts on +Z at the configured distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitCamera {
    yaw: f32,
    pitch: f32,
    distance: f32,
    fov_degrees: f32,
    locked: bool,
}

impl OrbitCamera {
    pub fn new(settings: &CameraSettings) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: settings.distance.clamp(MIN_DISTANCE, MAX_DISTANCE),
            fov_degrees: settings.fov_degrees,
            locked: settings.lock,
        }
    }

    pub fn sync(&mut self, settings: &CameraSettings) {
        self.locked = settings.lock;
        self.fov_degrees = settings.fov_degrees;
    }

    /// Rotates around the target; `dx`/`dy` are in radians.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        if self.locked {
            return;
        }
        self.yaw -= dx;
        self.pitch = (self.pitch + dy).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Positive steps move closer.
    pub fn zoom(&mut self, steps: f32) {
        if self.locked {
            return;
        }
        self.distance = (self.distance * 0.9f32.powf(steps)).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    pub fn eye(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch) * self.distance
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), aspect, NEAR_PLANE, FAR_PLANE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_sits_on_positive_z() {
        let camera = OrbitCamera::new(&CameraSettings::default());
        assert!((camera.eye() - Vec3::new(0.0, 0.0, 4.0)).length() < 1e-5);
    }

    #[test]
    fn locked_camera_ignores_input() {
        let settings = CameraSettings {
            lock: true,
            ..CameraSettings::default()
        };
        let mut camera = OrbitCamera::new(&settings);
        let before = camera;
        camera.orbit(0.5, 0.5);
        camera.zoom(3.0);
        assert_eq!(camera, before);
    }

    #[test]
    fn orbit_keeps_distance() {
        let mut camera = OrbitCamera::new(&CameraSettings::default());
        camera.orbit(1.0, 0.4);
        assert!((camera.eye().length() - 4.0).abs() < 1e-4);
    }
}
