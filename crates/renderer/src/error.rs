use std::path::PathBuf;

use thiserror::Error;

use crate::types::MaterialChannel;

/// Failures raised by a [`crate::engine::RenderEngine`] implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },

    #[error("shader program '{label}' failed to compile: {message}")]
    Compile { label: String, message: String },

    #[error("program has no uniform named '{0}'")]
    UnknownUniform(String),

    #[error("surface is unavailable: {0}")]
    Surface(String),

    #[error("texture upload failed: {0}")]
    Upload(String),

    #[error("frame readback failed: {0}")]
    Readback(String),

    #[error("nothing has been rendered yet")]
    NoFrame,
}

/// Raw image bytes that could not be turned into pixels.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("image has no pixels")]
    Empty,

    #[error("pixel buffer does not match {width}x{height}")]
    SizeMismatch { width: u32, height: u32 },
}

/// What a decode completion was for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeTarget {
    Channel(MaterialChannel),
    Environment,
}

impl std::fmt::Display for DecodeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeTarget::Channel(channel) => write!(f, "{channel} channel"),
            DecodeTarget::Environment => f.write_str("environment"),
        }
    }
}

/// Viewer-level failures surfaced to the UI layer.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to load '{source_name}' for the {target}: {error}")]
    SourceDecode {
        target: DecodeTarget,
        source_name: String,
        error: String,
    },

    #[error("a capture is already in progress")]
    CaptureInProgress,

    #[error("capture scale must be at least 1, got {0}")]
    InvalidCaptureScale(f32),

    #[error("No textures loaded")]
    NothingToExport,

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode capture: {0}")]
    Encode(#[from] image::ImageError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
