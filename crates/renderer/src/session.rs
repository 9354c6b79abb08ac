use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::camera::OrbitCamera;
use crate::capture::{CaptureRequest, CaptureService, CaptureSink};
use crate::decode::{DecodeWorker, ThreadedDecoder};
use crate::driver::{FrameContext, FrameReport, RenderLoopDriver};
use crate::engine::RenderEngine;
use crate::environment::EnvironmentSelector;
use crate::error::ViewerError;
use crate::shader::ShaderAugmentor;
use crate::textures::{ExportedChannel, TextureBindingManager};
use crate::types::{ImageSource, MaterialChannel, ViewerSettings};

/// Everything a UI needs: settings, channel uploads, captures, and export.
///
/// The engine is passed into every call that touches the GPU; the session
/// never stores it.
pub struct Session {
    settings: ViewerSettings,
    camera: OrbitCamera,
    textures: TextureBindingManager,
    environment: EnvironmentSelector,
    shader: ShaderAugmentor,
    capture: CaptureService,
    driver: RenderLoopDriver,
}

impl Session {
    pub fn new(settings: ViewerSettings) -> Self {
        Self::with_worker(settings, Arc::new(ThreadedDecoder))
    }

    pub fn with_worker(settings: ViewerSettings, worker: Arc<dyn DecodeWorker>) -> Self {
        Self {
            camera: OrbitCamera::new(&settings.camera),
            textures: TextureBindingManager::new(Arc::clone(&worker)),
            environment: EnvironmentSelector::new(worker),
            shader: ShaderAugmentor::default(),
            capture: CaptureService::new(),
            driver: RenderLoopDriver::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    /// Settings are read once per frame, so edits apply on the next frame.
    pub fn settings_mut(&mut self) -> &mut ViewerSettings {
        &mut self.settings
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    pub fn set_channel(
        &mut self,
        engine: &mut dyn RenderEngine,
        channel: MaterialChannel,
        source: Option<ImageSource>,
    ) {
        self.textures.set_channel_source(engine, channel, source);
    }

    pub fn set_environment_source(&mut self, source: Option<ImageSource>) {
        self.settings.environment.custom = source;
    }

    pub fn textures(&self) -> &TextureBindingManager {
        &self.textures
    }

    pub fn environment(&self) -> &EnvironmentSelector {
        &self.environment
    }

    pub fn shader(&self) -> &ShaderAugmentor {
        &self.shader
    }

    pub fn driver(&self) -> &RenderLoopDriver {
        &self.driver
    }

    pub fn capture_pending(&self) -> bool {
        self.capture.is_pending()
    }

    /// Arms a capture; the file is written after the next frame.
    pub fn request_capture(
        &mut self,
        engine: &mut dyn RenderEngine,
        scale: f32,
        filename: impl Into<PathBuf>,
    ) -> Result<(), ViewerError> {
        let request = CaptureRequest::new(scale, filename)?;
        self.capture.request(engine, request)
    }

    /// Drops a pending capture, restoring the surface it changed.
    pub fn cancel_capture(&mut self, engine: &mut dyn RenderEngine) {
        self.capture.abort(engine);
    }

    pub fn export_material(&self) -> Result<Vec<ExportedChannel>, ViewerError> {
        self.textures.export_entries()
    }

    pub fn frame(
        &mut self,
        engine: &mut dyn RenderEngine,
        sink: &mut dyn CaptureSink,
        elapsed: Duration,
    ) -> Result<FrameReport, ViewerError> {
        let ctx = FrameContext {
            engine,
            settings: &self.settings,
            camera: &mut self.camera,
            textures: &mut self.textures,
            environment: &mut self.environment,
            shader: &mut self.shader,
            capture: &mut self.capture,
            sink,
        };
        self.driver.frame(ctx, elapsed)
    }

    pub fn shutdown(&mut self, engine: &mut dyn RenderEngine) {
        self.capture.abort(engine);
        self.textures.release_all(engine);
        self.environment.release(engine);
        self.driver.release(engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::fixtures::png_bytes;
    use crate::decode::InlineDecoder;
    use crate::engine::SurfaceMetrics;
    use crate::testing::{FakeEngine, MemorySink};
    use crate::types::{GeometryKind, RimParameters};

    fn session() -> (FakeEngine, Session) {
        let engine = FakeEngine::new(SurfaceMetrics::new(320, 240, 1.0));
        let session = Session::with_worker(ViewerSettings::default(), Arc::new(InlineDecoder));
        (engine, session)
    }

    fn png(name: &str) -> ImageSource {
        ImageSource::from_bytes(name, png_bytes(2, 2, [90, 90, 90, 255]))
    }

    #[test]
    fn export_contains_only_uploaded_channels() {
        let (mut engine, mut session) = session();
        session.set_channel(&mut engine, MaterialChannel::BaseColor, Some(png("albedo.png")));
        session.set_channel(&mut engine, MaterialChannel::Roughness, Some(png("rough.png")));

        let names: Vec<_> = session
            .export_material()
            .unwrap()
            .iter()
            .map(|entry| entry.file_name)
            .collect();
        assert_eq!(names, vec!["material_basecolor.png", "material_roughness.png"]);
    }

    #[test]
    fn export_without_channels_reports_nothing() {
        let (_engine, session) = session();
        assert!(matches!(
            session.export_material(),
            Err(ViewerError::NothingToExport)
        ));
    }

    #[test]
    fn frames_bind_textures_and_environment() {
        let (mut engine, mut session) = session();
        let mut sink = MemorySink::default();
        session.set_channel(&mut engine, MaterialChannel::Normal, Some(png("n.png")));
        session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .unwrap();

        let frame = engine.last_frame().unwrap();
        assert!(frame.material[MaterialChannel::Normal.index()].is_some());
        assert!(frame.environment.is_some());
        let program = engine.program_source(frame.program).unwrap();
        assert!(program.fragment.contains("#define USE_NORMAL_MAP"));
    }

    #[test]
    fn slider_changes_only_touch_uniforms() {
        let (mut engine, mut session) = session();
        let mut sink = MemorySink::default();
        session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .unwrap();
        let compiled = engine.compiled.len();

        for step in 1..=10 {
            let settings = session.settings_mut();
            settings.shading.rim = RimParameters {
                strength: step as f32 * 0.1,
                power: 1.0 + step as f32 * 0.5,
            };
            settings.shading.roughness = 1.0 / step as f32;
            settings.shading.displacement_scale = step as f32 * 0.02;
            settings.shading.double_sided = step % 2 == 0;
            settings.shading.texture_repeat = [step as f32, 1.0];
            session
                .frame(&mut engine, &mut sink, Duration::from_millis(16))
                .unwrap();
        }

        assert_eq!(engine.compiled.len(), compiled);
        let last = engine.last_frame().unwrap();
        assert!((last.uniforms.displacement_bias + 0.1).abs() < 1e-6);
        assert!(last.uniforms.double_sided);
    }

    #[test]
    fn frames_carry_contact_shadow_settings() {
        let (mut engine, mut session) = session();
        let mut sink = MemorySink::default();
        session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .unwrap();
        assert!(engine.last_frame().unwrap().uniforms.contact_shadow.enabled);

        let shadow = &mut session.settings_mut().lighting.contact_shadow;
        shadow.enabled = false;
        shadow.opacity = 0.9;
        session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .unwrap();
        let uniforms = engine.last_frame().unwrap().uniforms;
        assert!(!uniforms.contact_shadow.enabled);
        assert_eq!(uniforms.contact_shadow.opacity, 0.9);
    }

    #[test]
    fn program_follows_binding_changes_only() {
        let (mut engine, mut session) = session();
        let mut sink = MemorySink::default();
        let tick = Duration::from_millis(16);
        session.set_channel(&mut engine, MaterialChannel::Normal, Some(png("n.png")));
        session.frame(&mut engine, &mut sink, tick).unwrap();
        let with_normal = engine.last_frame().unwrap().program;
        let compiled = engine.compiled.len();

        session.frame(&mut engine, &mut sink, tick).unwrap();
        assert_eq!(engine.last_frame().unwrap().program, with_normal);
        assert_eq!(engine.compiled.len(), compiled);

        // A failed decode unbinds the channel; the next frame drops the define.
        let broken = ImageSource::from_bytes("broken.png", b"not an image".to_vec());
        session.set_channel(&mut engine, MaterialChannel::Normal, Some(broken));
        session.frame(&mut engine, &mut sink, tick).unwrap();
        let program = engine.last_frame().unwrap().program;
        assert_ne!(program, with_normal);
        let source = engine.program_source(program).unwrap();
        assert!(!source.fragment.contains("#define USE_NORMAL_MAP"));
    }

    #[test]
    fn capture_completes_on_the_following_frame() {
        let (mut engine, mut session) = session();
        let mut sink = MemorySink::default();
        let original = engine.surface_metrics();

        session.request_capture(&mut engine, 2.0, "pbr_full.png").unwrap();
        assert!(matches!(
            session.request_capture(&mut engine, 1.0, "pbr_viewport.png"),
            Err(ViewerError::CaptureInProgress)
        ));

        let report = session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .unwrap();
        assert_eq!(
            report.capture.unwrap().unwrap(),
            PathBuf::from("pbr_full.png")
        );
        assert_eq!(engine.surface_metrics(), original);
        assert_eq!(sink.delivered.len(), 1);
    }

    #[test]
    fn failed_frame_aborts_capture_and_restores() {
        let (mut engine, mut session) = session();
        let mut sink = MemorySink::default();
        let original = engine.surface_metrics();

        session.request_capture(&mut engine, 2.0, "pbr_full.png").unwrap();
        engine.fail_next_submit = true;
        assert!(session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .is_err());
        assert!(!session.capture_pending());
        assert_eq!(engine.surface_metrics(), original);
        assert!(sink.delivered.is_empty());

        // The loop keeps going afterwards.
        assert!(session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .unwrap()
            .rendered);
    }

    #[test]
    fn geometry_switch_replaces_mesh() {
        let (mut engine, mut session) = session();
        let mut sink = MemorySink::default();
        session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .unwrap();
        let first = engine.last_frame().unwrap().mesh;

        session.settings_mut().geometry = GeometryKind::Cylinder;
        session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .unwrap();
        assert_ne!(engine.last_frame().unwrap().mesh, first);
        assert_eq!(engine.live_meshes(), 1);
    }

    #[test]
    fn auto_rotation_follows_elapsed_time() {
        let (mut engine, mut session) = session();
        let mut sink = MemorySink::default();
        session.settings_mut().shading.auto_rotate = true;
        session.settings_mut().shading.auto_rotate_speed = 1.5;
        for millis in [10u64, 500, 90, 400] {
            session
                .frame(&mut engine, &mut sink, Duration::from_millis(millis))
                .unwrap();
        }
        assert!((session.driver().auto_rotation() - 1.5).abs() < 1e-4);
    }

    #[test]
    fn shutdown_releases_gpu_resources() {
        let (mut engine, mut session) = session();
        let mut sink = MemorySink::default();
        session.set_channel(&mut engine, MaterialChannel::BaseColor, Some(png("a.png")));
        session
            .frame(&mut engine, &mut sink, Duration::from_millis(16))
            .unwrap();
        assert!(engine.live_textures() > 0);

        session.shutdown(&mut engine);
        assert_eq!(engine.live_textures(), 0);
        assert_eq!(engine.live_meshes(), 0);
    }
}
