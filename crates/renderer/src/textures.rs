//! Material channel bindings.
//!
//! Each channel carries a generation counter. Setting a source bumps the
//! counter and queues a decode stamped with the new value; a completion is
//! installed only if its stamp still matches, so the latest source always
//! wins no matter which decode finishes first. Nothing is cancelled: a
//! superseded decode runs to completion and is dropped on arrival.
use std::sync::Arc;

use crate::decode::{
    DecodeCompletion, DecodeInput, DecodeQueue, DecodeRequest, DecodeWorker, Resolution,
};
use crate::engine::{
    RenderEngine, TextureDescriptor, TextureId, TextureLayout, TextureMapping, WrapMode,
};
use crate::error::{DecodeTarget, ViewerError};
use crate::types::{ChannelMask, ImageSource, MaterialChannel, CHANNEL_COUNT};

#[derive(Default)]
struct ChannelBinding {
    source: Option<ImageSource>,
    generation: u64,
    handle: Option<TextureId>,
}

/// Raw bytes of one channel, named for the export archive.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportedChannel {
    pub channel: MaterialChannel,
    pub file_name: &'static str,
    pub source: ImageSource,
}

/// Names each source for the export archive, in channel order.
///
/// A channel listed twice keeps its last source. Fails with
/// [`ViewerError::NothingToExport`] when there is nothing to package.
pub fn export_channels(
    sources: impl IntoIterator<Item = (MaterialChannel, ImageSource)>,
) -> Result<Vec<ExportedChannel>, ViewerError> {
    let mut slots: [Option<ImageSource>; CHANNEL_COUNT] = Default::default();
    for (channel, source) in sources {
        slots[channel.index()] = Some(source);
    }
    let entries: Vec<_> = MaterialChannel::ALL
        .into_iter()
        .zip(slots)
        .filter_map(|(channel, source)| {
            source.map(|source| ExportedChannel {
                channel,
                file_name: channel.export_name(),
                source,
            })
        })
        .collect();
    if entries.is_empty() {
        return Err(ViewerError::NothingToExport);
    }
    Ok(entries)
}

pub struct TextureBindingManager {
    queue: DecodeQueue,
    bindings: [ChannelBinding; CHANNEL_COUNT],
    dirty: bool,
}

impl TextureBindingManager {
    pub fn new(worker: Arc<dyn DecodeWorker>) -> Self {
        Self {
            queue: DecodeQueue::new(worker),
            bindings: Default::default(),
            dirty: false,
        }
    }

    /// Records `source` for `channel` and schedules its decode.
    ///
    /// Clearing a channel releases its texture immediately.
    pub fn set_channel_source(
        &mut self,
        engine: &mut dyn RenderEngine,
        channel: MaterialChannel,
        source: Option<ImageSource>,
    ) {
        let binding = &mut self.bindings[channel.index()];
        binding.generation += 1;
        binding.source = source.clone();

        match source {
            Some(source) => {
                tracing::debug!(
                    %channel,
                    generation = binding.generation,
                    source = source.name(),
                    "channel source set"
                );
                self.queue.submit(DecodeRequest {
                    target: DecodeTarget::Channel(channel),
                    generation: binding.generation,
                    input: DecodeInput::Standard(source),
                    layout: TextureLayout {
                        color_space: channel.color_space(),
                        mapping: TextureMapping::Uv,
                    },
                });
            }
            None => {
                if let Some(handle) = binding.handle.take() {
                    engine.destroy_texture(handle);
                    self.dirty = true;
                }
                tracing::debug!(%channel, generation = binding.generation, "channel cleared");
            }
        }
    }

    /// Applies every decode that finished since the last call.
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
        let DecodeTarget::Channel(channel) = target else {
            return Resolution::Stale { target, generation };
        };
        let binding = &mut self.bindings[channel.index()];
        if generation != binding.generation {
            tracing::debug!(
                %channel,
                generation,
                current = binding.generation,
                "discarding stale texture"
            );
            return Resolution::Stale { target, generation };
        }

        let uploaded = result.map_err(|err| err.to_string()).and_then(|prepared| {
            let descriptor = TextureDescriptor {
                label: format!("{channel}:{source_name}"),
                color_space: channel.color_space(),
                wrap: WrapMode::Repeat,
                mapping: TextureMapping::Uv,
            };
            engine
                .create_texture(&prepared, &descriptor)
                .map_err(|err| err.to_string())
        });

        // Either way the previous texture no longer matches the recorded source.
        if let Some(previous) = binding.handle.take() {
            engine.destroy_texture(previous);
        }
        self.dirty = true;

        match uploaded {
            Ok(handle) => {
                binding.handle = Some(handle);
                tracing::debug!(%channel, generation, source = %source_name, "texture bound");
                Resolution::Installed { target, generation }
            }
            Err(error) => {
                // Undecodable bytes are not a material; keep them out of export.
                binding.source = None;
                tracing::warn!(
                    %channel,
                    source = %source_name,
                    %error,
                    "failed to load texture; channel left unset"
                );
                Resolution::Failed(ViewerError::SourceDecode {
                    target,
                    source_name,
                    error,
                })
            }
        }
    }

    pub fn handle(&self, channel: MaterialChannel) -> Option<TextureId> {
        self.bindings[channel.index()].handle
    }

    pub fn handles(&self) -> [Option<TextureId>; CHANNEL_COUNT] {
        MaterialChannel::ALL.map(|channel| self.handle(channel))
    }

    pub fn generation(&self, channel: MaterialChannel) -> u64 {
        self.bindings[channel.index()].generation
    }

    pub fn source(&self, channel: MaterialChannel) -> Option<&ImageSource> {
        self.bindings[channel.index()].source.as_ref()
    }

    /// Channels that currently hold a texture.
    pub fn bound_mask(&self) -> ChannelMask {
        MaterialChannel::ALL
            .into_iter()
            .filter(|channel| self.handle(*channel).is_some())
            .fold(ChannelMask::empty(), ChannelMask::with)
    }

    /// Returns whether bindings changed since the last call, and resets the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// One entry per channel that has a source, in channel order.
    pub fn export_entries(&self) -> Result<Vec<ExportedChannel>, ViewerError> {
        export_channels(MaterialChannel::ALL.into_iter().filter_map(|channel| {
            self.source(channel).map(|source| (channel, source.clone()))
        }))
    }

    /// Tears the material down. In-flight decodes become stale.
    pub fn release_all(&mut self, engine: &mut dyn RenderEngine) {
        for binding in &mut self.bindings {
            binding.generation += 1;
            binding.source = None;
            if let Some(handle) = binding.handle.take() {
                engine.destroy_texture(handle);
            }
        }
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::fixtures::png_bytes;
    use crate::decode::InlineDecoder;
    use crate::engine::SurfaceMetrics;
    use crate::testing::{DeferredDecoder, FakeEngine};
    use crate::types::ColorSpace;

    fn png(name: &str) -> ImageSource {
        ImageSource::from_bytes(name, png_bytes(2, 2, [200, 100, 50, 255]))
    }

    fn deferred() -> (DeferredDecoder, TextureBindingManager) {
        let decoder = DeferredDecoder::default();
        let manager = TextureBindingManager::new(Arc::new(decoder.clone()));
        (decoder, manager)
    }

    #[test]
    fn later_source_wins_when_earlier_finishes_last() {
        let mut engine = FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0));
        let (decoder, mut manager) = deferred();

        manager.set_channel_source(&mut engine, MaterialChannel::BaseColor, Some(png("a.png")));
        manager.set_channel_source(&mut engine, MaterialChannel::BaseColor, Some(png("b.png")));
        assert_eq!(decoder.pending(), 2);

        decoder.complete(1);
        decoder.complete(0);
        let resolutions = manager.poll(&mut engine);
        assert!(resolutions[0].is_installed());
        assert!(resolutions[1].is_stale());

        let handle = manager.handle(MaterialChannel::BaseColor).unwrap();
        assert_eq!(engine.texture_label(handle), Some("basecolor:b.png"));
        assert_eq!(engine.live_textures(), 1);
    }

    #[test]
    fn later_source_wins_when_earlier_finishes_first() {
        let mut engine = FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0));
        let (decoder, mut manager) = deferred();

        manager.set_channel_source(&mut engine, MaterialChannel::Normal, Some(png("a.png")));
        manager.set_channel_source(&mut engine, MaterialChannel::Normal, Some(png("b.png")));
        decoder.complete_all();
        manager.poll(&mut engine);

        let handle = manager.handle(MaterialChannel::Normal).unwrap();
        assert_eq!(engine.texture_label(handle), Some("normal:b.png"));
    }

    #[test]
    fn superseded_chain_binds_neither_when_cleared() {
        let mut engine = FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0));
        let (decoder, mut manager) = deferred();

        manager.set_channel_source(&mut engine, MaterialChannel::Roughness, Some(png("a.png")));
        manager.set_channel_source(&mut engine, MaterialChannel::Roughness, Some(png("b.png")));
        manager.set_channel_source(&mut engine, MaterialChannel::Roughness, None);
        decoder.complete_all();

        let resolutions = manager.poll(&mut engine);
        assert!(resolutions.iter().all(Resolution::is_stale));
        assert_eq!(manager.handle(MaterialChannel::Roughness), None);
        assert_eq!(engine.live_textures(), 0);
    }

    #[test]
    fn clearing_releases_immediately() {
        let mut engine = FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0));
        let mut manager = TextureBindingManager::new(Arc::new(InlineDecoder));

        manager.set_channel_source(&mut engine, MaterialChannel::Metalness, Some(png("m.png")));
        manager.poll(&mut engine);
        assert!(manager.take_dirty());
        assert_eq!(engine.live_textures(), 1);

        manager.set_channel_source(&mut engine, MaterialChannel::Metalness, None);
        assert_eq!(engine.live_textures(), 0);
        assert!(manager.take_dirty());
        assert!(manager.poll(&mut engine).is_empty());
    }

    #[test]
    fn color_policy_follows_channel() {
        let mut engine = FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0));
        let mut manager = TextureBindingManager::new(Arc::new(InlineDecoder));
        for channel in MaterialChannel::ALL {
            manager.set_channel_source(&mut engine, channel, Some(png("x.png")));
        }
        manager.poll(&mut engine);

        for channel in MaterialChannel::ALL {
            let descriptor = engine
                .texture_descriptor(manager.handle(channel).unwrap())
                .unwrap();
            assert_eq!(descriptor.color_space, channel.color_space());
            assert_eq!(descriptor.wrap, WrapMode::Repeat);
        }
        let base = manager.handle(MaterialChannel::BaseColor).unwrap();
        assert_eq!(
            engine.texture_descriptor(base).unwrap().color_space,
            ColorSpace::Srgb
        );
    }

    #[test]
    fn decode_failure_unsets_only_that_channel() {
        let mut engine = FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0));
        let mut manager = TextureBindingManager::new(Arc::new(InlineDecoder));

        manager.set_channel_source(&mut engine, MaterialChannel::BaseColor, Some(png("good.png")));
        manager.set_channel_source(&mut engine, MaterialChannel::Normal, Some(png("old.png")));
        manager.poll(&mut engine);

        let broken = ImageSource::from_bytes("broken.png", b"not a png".to_vec());
        manager.set_channel_source(&mut engine, MaterialChannel::Normal, Some(broken));
        let resolutions = manager.poll(&mut engine);

        assert!(matches!(
            &resolutions[..],
            [Resolution::Failed(ViewerError::SourceDecode { source_name, .. })] if source_name == "broken.png"
        ));
        assert_eq!(manager.handle(MaterialChannel::Normal), None);
        assert!(manager.handle(MaterialChannel::BaseColor).is_some());
        assert_eq!(engine.live_textures(), 1);
    }

    #[test]
    fn failed_source_is_left_out_of_export() {
        let mut engine = FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0));
        let mut manager = TextureBindingManager::new(Arc::new(InlineDecoder));

        manager.set_channel_source(&mut engine, MaterialChannel::BaseColor, Some(png("good.png")));
        let broken = ImageSource::from_bytes("broken.png", b"not a png".to_vec());
        manager.set_channel_source(&mut engine, MaterialChannel::Normal, Some(broken));
        manager.poll(&mut engine);

        assert!(manager.source(MaterialChannel::Normal).is_none());
        let exported: Vec<_> = manager
            .export_entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.source.name().to_string())
            .collect();
        assert_eq!(exported, vec!["good.png"]);
    }

    #[test]
    fn export_lists_channels_with_sources() {
        let mut engine = FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0));
        let (_decoder, mut manager) = deferred();
        assert!(matches!(
            manager.export_entries(),
            Err(ViewerError::NothingToExport)
        ));

        manager.set_channel_source(&mut engine, MaterialChannel::Roughness, Some(png("r.png")));
        manager.set_channel_source(&mut engine, MaterialChannel::Displacement, Some(png("h.png")));
        let names: Vec<_> = manager
            .export_entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.file_name)
            .collect();
        assert_eq!(names, vec!["material_roughness.png", "material_height.png"]);
    }

    #[test]
    fn export_channels_orders_by_channel_and_keeps_last_source() {
        let entries = export_channels([
            (MaterialChannel::Metalness, png("m.png")),
            (MaterialChannel::BaseColor, png("old.png")),
            (MaterialChannel::BaseColor, png("new.png")),
        ])
        .unwrap();
        let listed: Vec<_> = entries
            .iter()
            .map(|entry| (entry.file_name, entry.source.name()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("material_basecolor.png", "new.png"),
                ("material_metalness.png", "m.png"),
            ]
        );
        assert!(matches!(
            export_channels(Vec::new()),
            Err(ViewerError::NothingToExport)
        ));
    }

    #[test]
    fn release_all_frees_every_texture() {
        let mut engine = FakeEngine::new(SurfaceMetrics::new(640, 480, 1.0));
        let mut manager = TextureBindingManager::new(Arc::new(InlineDecoder));
        for channel in MaterialChannel::ALL {
            manager.set_channel_source(&mut engine, channel, Some(png("x.png")));
        }
        manager.poll(&mut engine);
        assert_eq!(manager.bound_mask().channels().count(), CHANNEL_COUNT);

        manager.release_all(&mut engine);
        assert_eq!(engine.live_textures(), 0);
        assert_eq!(manager.bound_mask(), ChannelMask::empty());
    }
}
