//! Resolution-scaled frame capture.
//!
//! A capture spans one frame boundary. [`CaptureService::request`] records the
//! current surface metrics and reconfigures the surface to `scale × density`.
//! The frame loop renders one frame and then calls [`CaptureService::complete`],
//! which reads the frame back, encodes it, hands it to a [`CaptureSink`], and
//! restores the recorded metrics whatever happened. [`CaptureService::abort`]
//! restores without reading back. Only one capture may be in flight.
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};

use crate::engine::{FrameReadback, RenderEngine, SurfaceMetrics};
use crate::error::{EngineError, ViewerError};

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    scale: f32,
    filename: PathBuf,
}

impl CaptureRequest {
    pub fn new(scale: f32, filename: impl Into<PathBuf>) -> Result<Self, ViewerError> {
        if !scale.is_finite() || scale < 1.0 {
            return Err(ViewerError::InvalidCaptureScale(scale));
        }
        Ok(Self {
            scale,
            filename: filename.into(),
        })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }
}

/// Destination for encoded captures.
pub trait CaptureSink {
    /// Stores `png` under `filename`, returning where it ended up.
    fn deliver(&mut self, filename: &Path, png: Vec<u8>) -> Result<PathBuf, ViewerError>;
}

/// Writes captures into a directory on disk.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl CaptureSink for DirectorySink {
    fn deliver(&mut self, filename: &Path, png: Vec<u8>) -> Result<PathBuf, ViewerError> {
        let path = self.directory.join(filename);
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ViewerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, png).map_err(|source| ViewerError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

struct InFlight {
    request: CaptureRequest,
    restore: SurfaceMetrics,
}

#[derive(Default)]
pub struct CaptureService {
    in_flight: Option<InFlight>,
}

impl CaptureService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Records the current surface and switches it to the capture density.
    pub fn request(
        &mut self,
        engine: &mut dyn RenderEngine,
        request: CaptureRequest,
    ) -> Result<(), ViewerError> {
        if self.in_flight.is_some() {
            return Err(ViewerError::CaptureInProgress);
        }
        let restore = engine.surface_metrics();
        let scaled = restore.with_density(restore.pixel_density * request.scale);
        if let Err(err) = engine.configure_surface(scaled) {
            restore_surface(engine, restore);
            return Err(err.into());
        }
        tracing::debug!(
            file = %request.filename.display(),
            scale = request.scale,
            density = scaled.pixel_density,
            "capture armed"
        );
        self.in_flight = Some(InFlight { request, restore });
        Ok(())
    }

    /// Reads back the frame rendered since [`request`](Self::request) and restores the surface.
    ///
    /// Returns `None` when no capture is pending.
    pub fn complete(
        &mut self,
        engine: &mut dyn RenderEngine,
        sink: &mut dyn CaptureSink,
    ) -> Option<Result<PathBuf, ViewerError>> {
        let InFlight { request, restore } = self.in_flight.take()?;
        let delivered = engine
            .read_pixels()
            .map_err(ViewerError::from)
            .and_then(|frame| encode_png(&frame))
            .and_then(|png| sink.deliver(&request.filename, png));
        restore_surface(engine, restore);
        match &delivered {
            Ok(path) => tracing::info!(path = %path.display(), "capture saved"),
            Err(err) => tracing::warn!(error = %err, "capture failed"),
        }
        Some(delivered)
    }

    /// Drops a pending capture and restores the surface.
    pub fn abort(&mut self, engine: &mut dyn RenderEngine) {
        if let Some(InFlight { request, restore }) = self.in_flight.take() {
            tracing::warn!(file = %request.filename.display(), "capture aborted");
            restore_surface(engine, restore);
        }
    }
}

fn restore_surface(engine: &mut dyn RenderEngine, restore: SurfaceMetrics) {
    if let Err(err) = engine.configure_surface(restore) {
        tracing::warn!(error = %err, "failed to restore surface after capture");
    }
}

fn encode_png(frame: &FrameReadback) -> Result<Vec<u8>, ViewerError> {
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone()).ok_or_else(
        || {
            EngineError::Readback(format!(
                "{} bytes do not fill a {}x{} frame",
                frame.rgba.len(),
                frame.width,
                frame.height
            ))
        },
    )?;
    let mut encoded = Cursor::new(Vec::new());
    image.write_to(&mut encoded, ImageFormat::Png)?;
    Ok(encoded.into_inner())
}
