//! Image decoding off the frame loop.
//!
//! A [`DecodeQueue`] owns the completion channel for one component. Requests
//! are handed to a shared [`DecodeWorker`], which decodes and builds the full
//! mip chain; finished work comes back over a `crossbeam-channel` and is
//! drained by the frame loop, which only copies the prepared bytes to the GPU.
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use image::ImageFormat;

use crate::engine::{DecodedImage, PixelData, PreparedTexture, TextureLayout};
use crate::environment::preset_panorama;
use crate::error::{DecodeError, DecodeTarget, ViewerError};
use crate::prepare::prepare;
use crate::types::{EnvironmentPreset, HdrFormat, ImageSource};

/// Which decoder turns a request into pixels.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeInput {
    /// 8-bit image formats (PNG, JPEG, ...).
    Standard(ImageSource),
    /// Unclamped radiance formats.
    Radiance(ImageSource, HdrFormat),
    /// Built-in panorama generated on the worker.
    Preset(EnvironmentPreset),
}

impl DecodeInput {
    pub fn display_name(&self) -> &str {
        match self {
            DecodeInput::Standard(source) | DecodeInput::Radiance(source, _) => source.name(),
            DecodeInput::Preset(preset) => preset.as_str(),
        }
    }

    pub fn decode(&self) -> Result<DecodedImage, DecodeError> {
        match self {
            DecodeInput::Standard(source) => decode_standard(source.bytes()),
            DecodeInput::Radiance(source, format) => decode_radiance(source.bytes(), *format),
            DecodeInput::Preset(preset) => Ok(preset_panorama(*preset)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodeRequest {
    pub target: DecodeTarget,
    pub generation: u64,
    pub input: DecodeInput,
    pub layout: TextureLayout,
}

#[derive(Debug)]
pub struct DecodeCompletion {
    pub target: DecodeTarget,
    pub generation: u64,
    pub source_name: String,
    pub result: Result<PreparedTexture, DecodeError>,
}

/// Outcome of applying one completion to the component that requested it.
#[derive(Debug)]
pub enum Resolution {
    Installed { target: DecodeTarget, generation: u64 },
    /// Superseded before it finished; dropped without touching any state.
    Stale { target: DecodeTarget, generation: u64 },
    Failed(ViewerError),
}

impl Resolution {
    pub fn is_installed(&self) -> bool {
        matches!(self, Resolution::Installed { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Resolution::Stale { .. })
    }
}

impl DecodeRequest {
    /// Decodes and prepares the mip chain on the calling thread.
    pub fn run(self) -> DecodeCompletion {
        let result = self
            .input
            .decode()
            .and_then(|image| prepare(&image, self.layout));
        DecodeCompletion {
            source_name: self.input.display_name().to_string(),
            target: self.target,
            generation: self.generation,
            result,
        }
    }
}

/// Executes decode requests and reports back on the supplied channel.
pub trait DecodeWorker: Send + Sync {
    fn submit(&self, request: DecodeRequest, completions: Sender<DecodeCompletion>);
}

/// Decodes every request on its own short-lived worker thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadedDecoder;

impl DecodeWorker for ThreadedDecoder {
    fn submit(&self, request: DecodeRequest, completions: Sender<DecodeCompletion>) {
        let name = format!("pbrview-decode-{}", request.input.display_name());
        let spawned = thread::Builder::new().name(name).spawn({
            let request = request.clone();
            let completions = completions.clone();
            move || {
                let completion = request.run();
                let _ = completions.send(completion);
            }
        });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn decode thread; decoding inline");
            let _ = completions.send(request.run());
        }
    }
}

/// Decodes synchronously inside `submit`; results still arrive through the queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDecoder;

impl DecodeWorker for InlineDecoder {
    fn submit(&self, request: DecodeRequest, completions: Sender<DecodeCompletion>) {
        let _ = completions.send(request.run());
    }
}

pub struct DecodeQueue {
    worker: Arc<dyn DecodeWorker>,
    sender: Sender<DecodeCompletion>,
    receiver: Receiver<DecodeCompletion>,
}

impl DecodeQueue {
    pub fn new(worker: Arc<dyn DecodeWorker>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            worker,
            sender,
            receiver,
        }
    }

    pub fn submit(&self, request: DecodeRequest) {
        tracing::debug!(
            slot = %request.target,
            generation = request.generation,
            source = request.input.display_name(),
            "queued decode"
        );
        self.worker.submit(request, self.sender.clone());
    }

    /// Everything that finished since the last drain; never blocks.
    pub fn drain(&self) -> Vec<DecodeCompletion> {
        self.receiver.try_iter().collect()
    }
}

pub fn decode_standard(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::Empty);
    }
    Ok(DecodedImage {
        width,
        height,
        pixels: PixelData::Rgba8(image.into_raw()),
    })
}

pub fn decode_radiance(bytes: &[u8], format: HdrFormat) -> Result<DecodedImage, DecodeError> {
    let format = match format {
        HdrFormat::RadianceHdr => ImageFormat::Hdr,
        HdrFormat::Exr => ImageFormat::OpenExr,
    };
    let image = image::load_from_memory_with_format(bytes, format)?.to_rgba32f();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::Empty);
    }
    Ok(DecodedImage {
        width,
        height,
        pixels: PixelData::RgbaF32(image.into_raw()),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb32FImage, RgbaImage};

    pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut cursor = Cursor::new(Vec::new());
        image
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("encode png fixture");
        cursor.into_inner()
    }

    pub fn exr_bytes(width: u32, height: u32, rgb: [f32; 3]) -> Vec<u8> {
        let image = Rgb32FImage::from_pixel(width, height, image::Rgb(rgb));
        let mut cursor = Cursor::new(Vec::new());
        image
            .write_to(&mut cursor, ImageFormat::OpenExr)
            .expect("encode exr fixture");
        cursor.into_inner()
    }
}
