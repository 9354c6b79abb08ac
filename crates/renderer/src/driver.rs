use std::path::PathBuf;
use std::time::Duration;

use glam::{EulerRot, Mat4};

use crate::camera::OrbitCamera;
use crate::capture::{CaptureService, CaptureSink};
use crate::decode::Resolution;
use crate::engine::{FrameDescription, FrameUniforms, MeshId, ProgramId, RenderEngine};
use crate::environment::EnvironmentSelector;
use crate::error::ViewerError;
use crate::geometry::GeometryProvider;
use crate::shader::ShaderAugmentor;
use crate::textures::TextureBindingManager;
use crate::types::{GeometryKind, ViewerSettings};

/// Auto-rotation angle advanced by wall-clock time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AutoRotation {
    angle: f32,
}

impl AutoRotation {
    pub fn advance(&mut self, elapsed: Duration, speed: f32, enabled: bool) {
        if enabled {
            self.angle += speed * elapsed.as_secs_f32();
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }
}

/// Mutable view of every component the frame loop drives.
pub struct FrameContext<'a> {
    pub engine: &'a mut dyn RenderEngine,
    pub settings: &'a ViewerSettings,
    pub camera: &'a mut OrbitCamera,
    pub textures: &'a mut TextureBindingManager,
    pub environment: &'a mut EnvironmentSelector,
    pub shader: &'a mut ShaderAugmentor,
    pub capture: &'a mut CaptureService,
    pub sink: &'a mut dyn CaptureSink,
}

/// What happened during one frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub resolutions: Vec<Resolution>,
    pub capture: Option<Result<PathBuf, ViewerError>>,
    pub rendered: bool,
}

#[derive(Default)]
pub struct RenderLoopDriver {
    rotation: AutoRotation,
    mesh: Option<(GeometryKind, MeshId)>,
    program: Option<ProgramId>,
    frames: u64,
}

impl RenderLoopDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_rotation(&self) -> f32 {
        self.rotation.angle()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Model transform: XYZ Euler rotation with the accumulated spin added to
    /// the Y angle, so the spin happens about the already-tilted Y axis.
    pub fn model_matrix(&self, settings: &ViewerSettings) -> Mat4 {
        let base = settings.shading.rotation_radians();
        Mat4::from_euler(
            EulerRot::XYZ,
            base.x,
            base.y + self.rotation.angle(),
            base.z,
        )
    }

    /// Runs one frame: resolve async work, pose the mesh, draw, finish any capture.
    ///
    /// Errors that prevent drawing are returned; decode failures are reported
    /// through [`FrameReport::resolutions`] and never stop the loop.
    pub fn frame(
        &mut self,
        ctx: FrameContext<'_>,
        elapsed: Duration,
    ) -> Result<FrameReport, ViewerError> {
        let FrameContext {
            engine,
            settings,
            camera,
            textures,
            environment,
            shader,
            capture,
            sink,
        } = ctx;
        let mut report = FrameReport::default();

        environment.apply(&settings.environment);
        report.resolutions.extend(textures.poll(engine));
        report.resolutions.extend(environment.poll(engine));
        let bindings_changed = textures.take_dirty();

        self.rotation.advance(
            elapsed,
            settings.shading.auto_rotate_speed,
            settings.shading.auto_rotate,
        );

        let drawn = self.draw(
            engine,
            settings,
            camera,
            textures,
            environment,
            shader,
            bindings_changed,
        );
        match drawn {
            Ok(()) => {
                report.rendered = true;
                self.frames += 1;
                report.capture = capture.complete(engine, sink);
                Ok(report)
            }
            Err(err) => {
                capture.abort(engine);
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw(
        &mut self,
        engine: &mut dyn RenderEngine,
        settings: &ViewerSettings,
        camera: &mut OrbitCamera,
        textures: &TextureBindingManager,
        environment: &EnvironmentSelector,
        shader: &mut ShaderAugmentor,
        bindings_changed: bool,
    ) -> Result<(), ViewerError> {
        let program = match self.program {
            Some(program) if !bindings_changed => {
                shader.sync_rim(engine, settings.shading.rim)?;
                program
            }
            _ => shader.ensure_program(engine, textures.bound_mask(), settings.shading.rim)?,
        };
        self.program = Some(program);
        let mesh = self.ensure_mesh(engine, settings.geometry)?;

        camera.sync(&settings.camera);
        let metrics = engine.surface_metrics();
        let view = camera.view();
        let projection = camera.projection(metrics.aspect_ratio());
        let shading = &settings.shading;
        let lighting = &settings.lighting;
        let frame = FrameDescription {
            mesh,
            program,
            model: self.model_matrix(settings),
            view,
            projection,
            eye: camera.eye(),
            material: textures.handles(),
            environment: environment.active_texture(),
            uniforms: FrameUniforms {
                displacement_scale: shading.displacement_scale,
                displacement_bias: shading.displacement_bias(),
                normal_scale: shading.normal_scale,
                roughness: shading.roughness,
                metalness: shading.metalness,
                uv_repeat: shading.texture_repeat,
                double_sided: shading.double_sided,
                environment_intensity: settings.environment.intensity,
                show_background: settings.environment.show_background,
                ambient_intensity: lighting.ambient_intensity,
                spot_intensity: lighting.spot_intensity,
                spot_angle: lighting.spot_angle,
                spot_penumbra: lighting.spot_penumbra,
                spot_position: lighting.spot_position,
                contact_shadow: lighting.contact_shadow,
                background: settings.camera.background.map(srgb_to_linear),
            },
        };
        engine.submit_frame(&frame)?;
        Ok(())
    }

    fn ensure_mesh(
        &mut self,
        engine: &mut dyn RenderEngine,
        kind: GeometryKind,
    ) -> Result<MeshId, ViewerError> {
        if let Some((current, mesh)) = self.mesh {
            if current == kind {
                return Ok(mesh);
            }
        }
        let mesh = engine.create_mesh(&GeometryProvider::build(kind))?;
        if let Some((_, previous)) = self.mesh.replace((kind, mesh)) {
            engine.destroy_mesh(previous);
        }
        tracing::debug!(geometry = kind.as_str(), "mesh built");
        Ok(mesh)
    }

    pub fn release(&mut self, engine: &mut dyn RenderEngine) {
        self.program = None;
        if let Some((_, mesh)) = self.mesh.take() {
            engine.destroy_mesh(mesh);
        }
    }
}

pub(crate) fn srgb_to_linear(channel: u8) -> f32 {
    let c = channel as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
