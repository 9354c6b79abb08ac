use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use tracing::{error, info, warn};

use crate::capture::DirectorySink;
use crate::decode::Resolution;
use crate::engine::RenderEngine;
use crate::gpu::GpuEngine;
use crate::session::Session;
use crate::textures::ExportedChannel;
use crate::types::{
    EnvironmentPreset, GeometryKind, ImageSource, MaterialChannel, ViewerSettings,
};

/// Radians of orbit per pixel of drag.
const ORBIT_SPEED: f32 = 0.005;
const PIXELS_PER_SCROLL_LINE: f32 = 40.0;

/// Packs exported channels somewhere and reports where.
pub type MaterialExporter = Box<dyn FnMut(Vec<ExportedChannel>) -> Result<PathBuf>>;

/// File names used by the capture shortcuts.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureNames {
    pub viewport: String,
    pub full: String,
    pub full_scale: f32,
}

impl Default for CaptureNames {
    fn default() -> Self {
        Self {
            viewport: "pbr_viewport.png".into(),
            full: "pbr_full.png".into(),
            full_scale: 2.0,
        }
    }
}

/// Everything the preview window needs to start.
pub struct ViewerOptions {
    pub settings: ViewerSettings,
    pub channels: Vec<(MaterialChannel, ImageSource)>,
    pub window_size: (u32, u32),
    pub capture_directory: PathBuf,
    pub captures: CaptureNames,
    pub exporter: MaterialExporter,
}

/// Actions bound to keys in the preview window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ViewerCommand {
    SelectGeometry(GeometryKind),
    ToggleAutoRotate,
    ToggleBackground,
    ToggleDoubleSided,
    ToggleCameraLock,
    NextPreset,
    CaptureViewport,
    CaptureFull,
    ExportMaterial,
    Quit,
}

impl ViewerCommand {
    pub fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::Named(NamedKey::Escape) => Some(Self::Quit),
            Key::Character(value) => match value.to_ascii_lowercase().as_str() {
                "1" => Some(Self::SelectGeometry(GeometryKind::Sphere)),
                "2" => Some(Self::SelectGeometry(GeometryKind::Cube)),
                "3" => Some(Self::SelectGeometry(GeometryKind::Cylinder)),
                "4" => Some(Self::SelectGeometry(GeometryKind::Plane)),
                "r" => Some(Self::ToggleAutoRotate),
                "b" => Some(Self::ToggleBackground),
                "d" => Some(Self::ToggleDoubleSided),
                "l" => Some(Self::ToggleCameraLock),
                "n" => Some(Self::NextPreset),
                "p" => Some(Self::CaptureViewport),
                "f" => Some(Self::CaptureFull),
                "e" => Some(Self::ExportMaterial),
                _ => None,
            },
            _ => None,
        }
    }
}

/// What the event loop should do after a command.
#[derive(Debug, PartialEq)]
pub enum CommandOutcome {
    Continue,
    Export(Vec<ExportedChannel>),
    Exit,
}

/// Applies `command` to the session. Failures are logged, never fatal.
pub fn apply_command(
    session: &mut Session,
    engine: &mut dyn RenderEngine,
    captures: &CaptureNames,
    command: ViewerCommand,
) -> CommandOutcome {
    let settings = session.settings_mut();
    match command {
        ViewerCommand::SelectGeometry(kind) => {
            settings.geometry = kind;
            info!(geometry = kind.as_str(), "geometry selected");
        }
        ViewerCommand::ToggleAutoRotate => {
            settings.shading.auto_rotate = !settings.shading.auto_rotate;
        }
        ViewerCommand::ToggleBackground => {
            settings.environment.show_background = !settings.environment.show_background;
        }
        ViewerCommand::ToggleDoubleSided => {
            settings.shading.double_sided = !settings.shading.double_sided;
        }
        ViewerCommand::ToggleCameraLock => {
            settings.camera.lock = !settings.camera.lock;
        }
        ViewerCommand::NextPreset => {
            let presets = EnvironmentPreset::ALL;
            let current = settings.environment.preset;
            let index = presets
                .iter()
                .position(|preset| *preset == current)
                .unwrap_or(0);
            let next = presets[(index + 1) % presets.len()];
            settings.environment.preset = next;
            settings.environment.custom = None;
            info!(preset = next.as_str(), "environment preset selected");
        }
        ViewerCommand::CaptureViewport => {
            if let Err(err) = session.request_capture(engine, 1.0, captures.viewport.as_str()) {
                warn!(error = %err, "viewport capture rejected");
            }
        }
        ViewerCommand::CaptureFull => {
            if let Err(err) =
                session.request_capture(engine, captures.full_scale, captures.full.as_str())
            {
                warn!(error = %err, "full capture rejected");
            }
        }
        ViewerCommand::ExportMaterial => match session.export_material() {
            Ok(entries) => return CommandOutcome::Export(entries),
            Err(err) => warn!("{err}"),
        },
        ViewerCommand::Quit => return CommandOutcome::Exit,
    }
    CommandOutcome::Continue
}

#[derive(Default)]
struct DragState {
    position: Option<PhysicalPosition<f64>>,
    dragging: bool,
}

impl DragState {
    /// Returns the movement since the last cursor event while dragging.
    fn moved(&mut self, position: PhysicalPosition<f64>) -> Option<(f32, f32)> {
        let previous = self.position.replace(position)?;
        self.dragging.then(|| {
            (
                (position.x - previous.x) as f32,
                (position.y - previous.y) as f32,
            )
        })
    }
}

fn log_resolutions(resolutions: Vec<Resolution>) {
    for resolution in resolutions {
        match resolution {
            Resolution::Failed(err) => warn!("{err}"),
            Resolution::Stale { target, generation } => {
                tracing::debug!(%target, generation, "stale decode dropped");
            }
            Resolution::Installed { target, generation } => {
                tracing::debug!(%target, generation, "decode installed");
            }
        }
    }
}

/// Opens the preview window and runs until it closes.
pub fn run_viewer(options: ViewerOptions) -> Result<()> {
    let ViewerOptions {
        settings,
        channels,
        window_size,
        capture_directory,
        captures,
        mut exporter,
    } = options;

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("pbrview")
            .with_inner_size(LogicalSize::new(window_size.0, window_size.1))
            .build(&event_loop)
            .context("failed to create preview window")?,
    );
    let mut engine = GpuEngine::new(Arc::clone(&window))?;
    let mut session = Session::new(settings);
    for (channel, source) in channels {
        info!(%channel, source = source.name(), "loading channel");
        session.set_channel(&mut engine, channel, Some(source));
    }

    let mut sink = DirectorySink::new(capture_directory);
    let mut drag = DragState::default();
    let mut last_frame = Instant::now();
    window.request_redraw();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                session.shutdown(&mut engine);
                elwt.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                let Some(command) = ViewerCommand::from_key(&event.logical_key) else {
                    return;
                };
                match apply_command(&mut session, &mut engine, &captures, command) {
                    CommandOutcome::Continue => {}
                    CommandOutcome::Export(entries) => match exporter(entries) {
                        Ok(path) => info!(path = %path.display(), "material exported"),
                        Err(err) => error!("material export failed: {err:?}"),
                    },
                    CommandOutcome::Exit => {
                        session.shutdown(&mut engine);
                        elwt.exit();
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some((dx, dy)) = drag.moved(position) {
                    session
                        .camera_mut()
                        .orbit(dx * ORBIT_SPEED, dy * ORBIT_SPEED);
                }
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                drag.dragging = button_state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(offset) => {
                        offset.y as f32 / PIXELS_PER_SCROLL_LINE
                    }
                };
                session.camera_mut().zoom(steps);
            }
            WindowEvent::Resized(new_size) => {
                session.cancel_capture(&mut engine);
                engine.resize(new_size, window.scale_factor());
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                session.cancel_capture(&mut engine);
                engine.resize(window.inner_size(), scale_factor);
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let elapsed = now.saturating_duration_since(last_frame);
                last_frame = now;
                match session.frame(&mut engine, &mut sink, elapsed) {
                    Ok(report) => log_resolutions(report.resolutions),
                    Err(err) => error!("frame failed: {err}"),
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            window.request_redraw();
            elwt.set_control_flow(ControlFlow::Wait);
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use winit::keyboard::SmolStr;

    use super::*;
    use crate::decode::fixtures::png_bytes;
    use crate::decode::InlineDecoder;
    use crate::engine::SurfaceMetrics;
    use crate::testing::FakeEngine;

    fn character(value: &str) -> Key {
        Key::Character(SmolStr::new(value))
    }

    fn session() -> (FakeEngine, Session) {
        (
            FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0)),
            Session::with_worker(ViewerSettings::default(), Arc::new(InlineDecoder)),
        )
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(
            ViewerCommand::from_key(&character("3")),
            Some(ViewerCommand::SelectGeometry(GeometryKind::Cylinder))
        );
        assert_eq!(
            ViewerCommand::from_key(&character("F")),
            Some(ViewerCommand::CaptureFull)
        );
        assert_eq!(
            ViewerCommand::from_key(&Key::Named(NamedKey::Escape)),
            Some(ViewerCommand::Quit)
        );
        assert_eq!(ViewerCommand::from_key(&character("z")), None);
    }

    #[test]
    fn toggles_flip_settings() {
        let (mut engine, mut session) = session();
        let captures = CaptureNames::default();
        for command in [
            ViewerCommand::ToggleAutoRotate,
            ViewerCommand::ToggleBackground,
            ViewerCommand::ToggleDoubleSided,
            ViewerCommand::ToggleCameraLock,
        ] {
            assert_eq!(
                apply_command(&mut session, &mut engine, &captures, command),
                CommandOutcome::Continue
            );
        }
        let settings = session.settings();
        assert!(settings.shading.auto_rotate);
        assert!(settings.environment.show_background);
        assert!(settings.shading.double_sided);
        assert!(settings.camera.lock);
    }

    #[test]
    fn next_preset_wraps_and_drops_custom_source() {
        let (mut engine, mut session) = session();
        let captures = CaptureNames::default();
        session.settings_mut().environment.preset = EnvironmentPreset::Warehouse;
        session.set_environment_source(Some(ImageSource::from_bytes("sky.png", vec![1])));

        apply_command(&mut session, &mut engine, &captures, ViewerCommand::NextPreset);
        let environment = &session.settings().environment;
        assert_eq!(environment.preset, EnvironmentPreset::ALL[0]);
        assert!(environment.custom.is_none());
    }

    #[test]
    fn export_without_material_continues() {
        let (mut engine, mut session) = session();
        let outcome = apply_command(
            &mut session,
            &mut engine,
            &CaptureNames::default(),
            ViewerCommand::ExportMaterial,
        );
        assert_eq!(outcome, CommandOutcome::Continue);
    }

    #[test]
    fn export_returns_loaded_channels() {
        let (mut engine, mut session) = session();
        session.set_channel(
            &mut engine,
            MaterialChannel::Metalness,
            Some(ImageSource::from_bytes("metal.png", png_bytes(1, 1, [0, 0, 255, 255]))),
        );
        let outcome = apply_command(
            &mut session,
            &mut engine,
            &CaptureNames::default(),
            ViewerCommand::ExportMaterial,
        );
        match outcome {
            CommandOutcome::Export(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].file_name, "material_metalness.png");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn second_capture_shortcut_is_rejected_while_pending() {
        let (mut engine, mut session) = session();
        let captures = CaptureNames::default();
        apply_command(&mut session, &mut engine, &captures, ViewerCommand::CaptureFull);
        assert_eq!(engine.surface_metrics().pixel_density, 2.0);
        apply_command(&mut session, &mut engine, &captures, ViewerCommand::CaptureViewport);
        assert_eq!(engine.surface_metrics().pixel_density, 2.0);
        assert!(session.capture_pending());
    }

    #[test]
    fn drag_reports_deltas_only_while_pressed() {
        let mut drag = DragState::default();
        assert_eq!(drag.moved(PhysicalPosition::new(10.0, 10.0)), None);
        assert_eq!(drag.moved(PhysicalPosition::new(15.0, 10.0)), None);
        drag.dragging = true;
        assert_eq!(
            drag.moved(PhysicalPosition::new(20.0, 4.0)),
            Some((5.0, -6.0))
        );
    }
}
