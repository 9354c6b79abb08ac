//! Environment light probe selection.
//!
//! The active [`EnvironmentMode`] is derived from [`EnvironmentState`]. Each
//! mode maps to a decoding path: radiance formats decode to floating point and
//! are mapped as an equirectangular reflection probe, everything else takes the
//! standard 8-bit path. Swaps are version-stamped like texture bindings, and a
//! failed decode keeps the previous environment on screen.
use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::sync::Arc;

use crate::decode::{
    DecodeCompletion, DecodeInput, DecodeQueue, DecodeRequest, DecodeWorker, Resolution,
};
use crate::engine::{
    DecodedImage, PixelData, RenderEngine, TextureDescriptor, TextureId, TextureLayout,
    TextureMapping, WrapMode,
};
use crate::error::{DecodeTarget, ViewerError};
use crate::types::{ColorSpace, EnvironmentMode, EnvironmentPreset, EnvironmentState};

/// Decoder and sampling setup chosen for one environment mode.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentPlan {
    pub input: DecodeInput,
    pub mapping: TextureMapping,
    pub color_space: ColorSpace,
}

impl EnvironmentPlan {
    pub fn for_mode(mode: &EnvironmentMode) -> Self {
        match mode {
            EnvironmentMode::CustomHdr(source, format) => Self {
                input: DecodeInput::Radiance(source.clone(), *format),
                mapping: TextureMapping::EquirectangularReflection,
                color_space: ColorSpace::Linear,
            },
            EnvironmentMode::CustomLdr(source) => Self {
                input: DecodeInput::Standard(source.clone()),
                mapping: TextureMapping::Equirectangular,
                color_space: ColorSpace::Srgb,
            },
            EnvironmentMode::Preset(preset) => Self {
                input: DecodeInput::Preset(*preset),
                mapping: TextureMapping::Equirectangular,
                color_space: ColorSpace::Srgb,
            },
        }
    }

    pub fn layout(&self) -> TextureLayout {
        TextureLayout {
            color_space: self.color_space,
            mapping: self.mapping,
        }
    }

    fn descriptor(&self, source_name: &str) -> TextureDescriptor {
        TextureDescriptor {
            label: format!("environment:{source_name}"),
            color_space: self.color_space,
            wrap: WrapMode::Panorama,
            mapping: self.mapping,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActiveEnvironment {
    pub texture: TextureId,
    pub mapping: TextureMapping,
    pub source_name: String,
}

pub struct EnvironmentSelector {
    queue: DecodeQueue,
    generation: u64,
    requested: Option<EnvironmentMode>,
    pending: Option<(u64, EnvironmentPlan)>,
    active: Option<ActiveEnvironment>,
}

impl EnvironmentSelector {
    pub fn new(worker: Arc<dyn DecodeWorker>) -> Self {
        Self {
            queue: DecodeQueue::new(worker),
            generation: 0,
            requested: None,
            pending: None,
            active: None,
        }
    }

    /// Schedules a decode when the derived mode differs from the last request.
    ///
    /// Intensity and background visibility never trigger a reload.
    pub fn apply(&mut self, state: &EnvironmentState) -> bool {
        let mode = state.mode();
        if self.requested.as_ref() == Some(&mode) {
            return false;
        }
        let plan = EnvironmentPlan::for_mode(&mode);
        self.generation += 1;
        tracing::debug!(
            generation = self.generation,
            source = plan.input.display_name(),
            mapping = ?plan.mapping,
            "environment requested"
        );
        self.queue.submit(DecodeRequest {
            target: DecodeTarget::Environment,
            generation: self.generation,
            input: plan.input.clone(),
            layout: plan.layout(),
        });
        self.pending = Some((self.generation, plan));
        self.requested = Some(mode);
        true
    }

    pub fn poll(&mut self, engine: &mut dyn RenderEngine) -> Vec<Resolution> {
        self.queue
            .drain()
            .into_iter()
            .map(|completion| self.resolve(engine, completion))
            .collect()
    }

    fn resolve(
        &mut self,
        engine: &mut dyn RenderEngine,
        completion: DecodeCompletion,
    ) -> Resolution {
        let DecodeCompletion {
            target,
            generation,
            source_name,
            result,
        } = completion;
        let plan = match &self.pending {
            Some((pending, plan)) if *pending == generation => plan.clone(),
            _ => {
                tracing::debug!(generation, current = self.generation, "discarding stale environment");
                return Resolution::Stale { target, generation };
            }
        };
        self.pending = None;

        let uploaded = result.map_err(|err| err.to_string()).and_then(|prepared| {
            engine
                .create_texture(&prepared, &plan.descriptor(&source_name))
                .map_err(|err| err.to_string())
        });
        match uploaded {
            Ok(texture) => {
                let next = ActiveEnvironment {
                    texture,
                    mapping: plan.mapping,
                    source_name,
                };
                if let Some(previous) = self.active.replace(next) {
                    engine.destroy_texture(previous.texture);
                }
                tracing::info!(
                    source = self.active_source().unwrap_or_default(),
                    "environment loaded"
                );
                Resolution::Installed { target, generation }
            }
            Err(error) => {
                tracing::warn!(
                    source = %source_name,
                    %error,
                    "failed to load environment; keeping previous"
                );
                Resolution::Failed(ViewerError::SourceDecode {
                    target,
                    source_name,
                    error,
                })
            }
        }
    }

    pub fn active(&self) -> Option<&ActiveEnvironment> {
        self.active.as_ref()
    }

    pub fn active_texture(&self) -> Option<TextureId> {
        self.active.as_ref().map(|active| active.texture)
    }

    fn active_source(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.source_name.as_str())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn release(&mut self, engine: &mut dyn RenderEngine) {
        self.generation += 1;
        self.pending = None;
        self.requested = None;
        if let Some(active) = self.active.take() {
            engine.destroy_texture(active.texture);
        }
    }
}

const PANORAMA_WIDTH: u32 = 256;
const PANORAMA_HEIGHT: u32 = 128;

struct Palette {
    zenith: [f32; 3],
    horizon: [f32; 3],
    ground: [f32; 3],
    sun: [f32; 3],
    sun_azimuth: f32,
    sun_elevation: f32,
    sun_size: f32,
}

fn palette(preset: EnvironmentPreset) -> Palette {
    let (zenith, horizon, ground, sun, sun_azimuth, sun_elevation, sun_size) = match preset {
        EnvironmentPreset::Apartment => ([200., 190., 170.], [230., 215., 190.], [90., 75., 60.], [255., 240., 210.], 0.8, 0.4, 0.35),
        EnvironmentPreset::City => ([120., 150., 190.], [200., 205., 210.], [70., 70., 75.], [255., 245., 230.], 2.2, 0.6, 0.15),
        EnvironmentPreset::Dawn => ([70., 90., 150.], [250., 170., 120.], [60., 50., 60.], [255., 200., 150.], 1.2, 0.05, 0.2),
        EnvironmentPreset::Forest => ([140., 170., 150.], [170., 190., 150.], [50., 60., 35.], [230., 240., 200.], 4.0, 0.9, 0.3),
        EnvironmentPreset::Lobby => ([220., 215., 205.], [235., 230., 220.], [120., 110., 100.], [255., 250., 240.], 0.0, 1.2, 0.5),
        EnvironmentPreset::Night => ([10., 15., 35.], [40., 45., 70.], [15., 15., 20.], [200., 210., 255.], 5.0, 0.7, 0.05),
        EnvironmentPreset::Park => ([90., 150., 220.], [190., 215., 235.], [80., 110., 50.], [255., 250., 220.], 3.0, 0.8, 0.12),
        EnvironmentPreset::Studio => ([235., 235., 235.], [180., 180., 180.], [60., 60., 60.], [255., 255., 255.], 0.6, 1.0, 0.6),
        EnvironmentPreset::Sunset => ([60., 70., 130.], [255., 140., 80.], [50., 35., 35.], [255., 170., 90.], 1.8, 0.08, 0.18),
        EnvironmentPreset::Warehouse => ([150., 145., 135.], [190., 180., 160.], [80., 75., 70.], [255., 235., 200.], 2.6, 1.1, 0.4),
    };
    Palette {
        zenith,
        horizon,
        ground,
        sun,
        sun_azimuth,
        sun_elevation,
        sun_size,
    }
}

fn direction(azimuth: f32, elevation: f32) -> [f32; 3] {
    let (sin_el, cos_el) = elevation.sin_cos();
    [cos_el * azimuth.cos(), sin_el, cos_el * azimuth.sin()]
}

/// Procedural sRGB sky panorama standing in for a bundled preset.
pub fn preset_panorama(preset: EnvironmentPreset) -> DecodedImage {
    let palette = palette(preset);
    let sun = direction(palette.sun_azimuth, palette.sun_elevation);
    let mut rgba = Vec::with_capacity((PANORAMA_WIDTH * PANORAMA_HEIGHT * 4) as usize);
    for y in 0..PANORAMA_HEIGHT {
        let elevation = FRAC_PI_2 - (y as f32 + 0.5) / PANORAMA_HEIGHT as f32 * PI;
        for x in 0..PANORAMA_WIDTH {
            let azimuth = (x as f32 + 0.5) / PANORAMA_WIDTH as f32 * TAU - PI;
            let (from, to, t) = if elevation >= 0.0 {
                (palette.horizon, palette.zenith, (elevation / FRAC_PI_2).sqrt())
            } else {
                (palette.horizon, palette.ground, (-elevation / FRAC_PI_2).powf(0.35))
            };
            let view = direction(azimuth, elevation);
            let cosine = view[0] * sun[0] + view[1] * sun[1] + view[2] * sun[2];
            let angle = cosine.clamp(-1.0, 1.0).acos();
            let glow = (-(angle * angle) / (palette.sun_size * palette.sun_size)).exp();
            for channel in 0..3 {
                let sky = from[channel] + (to[channel] - from[channel]) * t;
                let lit = sky + (palette.sun[channel] - sky) * glow;
                rgba.push(lit.round().clamp(0.0, 255.0) as u8);
            }
            rgba.push(255);
        }
    }
    DecodedImage {
        width: PANORAMA_WIDTH,
        height: PANORAMA_HEIGHT,
        pixels: PixelData::Rgba8(rgba),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::fixtures::{exr_bytes, png_bytes};
    use crate::decode::InlineDecoder;
    use crate::engine::SurfaceMetrics;
    use crate::testing::{DeferredDecoder, FakeEngine};
    use crate::types::{HdrFormat, ImageSource};

    fn engine() -> FakeEngine {
        FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0))
    }

    #[test]
    fn exr_takes_radiance_path_with_reflection_mapping() {
        let mut engine = engine();
        let mut selector = EnvironmentSelector::new(Arc::new(InlineDecoder));
        let bytes = exr_bytes(4, 2, [3.0, 2.0, 1.0]);
        let state = EnvironmentState {
            custom: Some(ImageSource::from_bytes("probe.exr", bytes.clone())),
            ..EnvironmentState::default()
        };

        let plan = EnvironmentPlan::for_mode(&state.mode());
        assert!(matches!(plan.input, DecodeInput::Radiance(_, HdrFormat::Exr)));
        assert_eq!(plan.mapping, TextureMapping::EquirectangularReflection);

        selector.apply(&state);
        assert!(selector.poll(&mut engine)[0].is_installed());
        let active = selector.active().unwrap();
        assert_eq!(active.mapping, TextureMapping::EquirectangularReflection);
        let descriptor = engine.texture_descriptor(active.texture).unwrap();
        assert_eq!(descriptor.color_space, ColorSpace::Linear);
        assert_eq!(descriptor.wrap, WrapMode::Panorama);

        // Same source under a .png name goes down the 8-bit path instead.
        let renamed = EnvironmentState {
            custom: Some(ImageSource::from_bytes("probe.png", bytes)),
            ..EnvironmentState::default()
        };
        let plan = EnvironmentPlan::for_mode(&renamed.mode());
        assert!(matches!(plan.input, DecodeInput::Standard(_)));
        assert_eq!(plan.mapping, TextureMapping::Equirectangular);
    }

    #[test]
    fn failed_decode_keeps_previous_environment() {
        let mut engine = engine();
        let mut selector = EnvironmentSelector::new(Arc::new(InlineDecoder));
        selector.apply(&EnvironmentState::default());
        selector.poll(&mut engine);
        let before = selector.active_texture().unwrap();

        let broken = EnvironmentState {
            custom: Some(ImageSource::from_bytes("broken.hdr", b"garbage".to_vec())),
            ..EnvironmentState::default()
        };
        selector.apply(&broken);
        let resolutions = selector.poll(&mut engine);

        assert!(matches!(
            &resolutions[..],
            [Resolution::Failed(ViewerError::SourceDecode { .. })]
        ));
        assert_eq!(selector.active_texture(), Some(before));
        assert_eq!(engine.live_textures(), 1);
    }

    #[test]
    fn rapid_swaps_install_only_the_latest() {
        let mut engine = engine();
        let decoder = DeferredDecoder::default();
        let mut selector = EnvironmentSelector::new(Arc::new(decoder.clone()));

        let preset = EnvironmentState::default();
        let custom = EnvironmentState {
            custom: Some(ImageSource::from_bytes("room.png", png_bytes(4, 2, [1, 2, 3, 255]))),
            ..EnvironmentState::default()
        };
        selector.apply(&preset);
        selector.apply(&custom);
        selector.apply(&preset);
        assert_eq!(decoder.pending(), 3);

        decoder.complete(0);
        decoder.complete(2);
        decoder.complete(1);
        let resolutions = selector.poll(&mut engine);
        assert!(resolutions[0].is_stale());
        assert!(resolutions[1].is_installed());
        assert!(resolutions[2].is_stale());
        assert_eq!(selector.active().unwrap().source_name, "city");
        assert_eq!(engine.live_textures(), 1);
    }

    #[test]
    fn intensity_and_background_do_not_reload() {
        let mut selector = EnvironmentSelector::new(Arc::new(DeferredDecoder::default()));
        let mut state = EnvironmentState::default();
        assert!(selector.apply(&state));
        state.intensity = 3.0;
        state.show_background = true;
        assert!(!selector.apply(&state));
        assert_eq!(selector.generation(), 1);
    }

    #[test]
    fn every_preset_produces_a_panorama() {
        for preset in EnvironmentPreset::ALL {
            let image = preset_panorama(preset);
            assert_eq!(image.width, 2 * image.height);
            match &image.pixels {
                PixelData::Rgba8(bytes) => assert_eq!(bytes.len(), image.texel_count() * 4),
                other => panic!("unexpected pixels {other:?}"),
            }
        }
    }
}
