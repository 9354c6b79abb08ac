//! In-memory collaborators for exercising the viewer without a GPU.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;

use crate::capture::CaptureSink;
use crate::decode::{DecodeCompletion, DecodeRequest, DecodeWorker};
use crate::engine::{
    FrameDescription, FrameReadback, MeshId, PreparedTexture, ProgramId, ProgramSource,
    RenderEngine, SurfaceMetrics, TextureDescriptor, TextureId, UniformValue,
};
use crate::error::{EngineError, ViewerError};
use crate::geometry::MeshData;

/// Records every engine call and keeps just enough state to answer queries.
pub struct FakeEngine {
    next_id: u64,
    metrics: SurfaceMetrics,
    meshes: BTreeMap<MeshId, usize>,
    textures: BTreeMap<TextureId, TextureDescriptor>,
    programs: BTreeMap<ProgramId, ProgramSource>,
    pub compiled: Vec<ProgramId>,
    pub uniform_writes: Vec<(ProgramId, String, UniformValue)>,
    pub configured: Vec<SurfaceMetrics>,
    pub frames: Vec<FrameDescription>,
    frame_metrics: Option<SurfaceMetrics>,
    pub fail_next_submit: bool,
    pub fail_configure_density: Option<f32>,
}

impl FakeEngine {
    pub fn new(metrics: SurfaceMetrics) -> Self {
        Self {
            next_id: 0,
            metrics,
            meshes: BTreeMap::new(),
            textures: BTreeMap::new(),
            programs: BTreeMap::new(),
            compiled: Vec::new(),
            uniform_writes: Vec::new(),
            configured: Vec::new(),
            frames: Vec::new(),
            frame_metrics: None,
            fail_next_submit: false,
            fail_configure_density: None,
        }
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn texture_descriptor(&self, texture: TextureId) -> Option<&TextureDescriptor> {
        self.textures.get(&texture)
    }

    pub fn texture_label(&self, texture: TextureId) -> Option<&str> {
        self.texture_descriptor(texture)
            .map(|descriptor| descriptor.label.as_str())
    }

    pub fn program_source(&self, program: ProgramId) -> Option<&ProgramSource> {
        self.programs.get(&program)
    }

    pub fn last_frame(&self) -> Option<&FrameDescription> {
        self.frames.last()
    }
}

impl RenderEngine for FakeEngine {
    fn create_mesh(&mut self, mesh: &MeshData) -> Result<MeshId, EngineError> {
        let id = MeshId(self.allocate());
        self.meshes.insert(id, mesh.vertices.len());
        Ok(id)
    }

    fn destroy_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(&mesh);
    }

    fn create_texture(
        &mut self,
        prepared: &PreparedTexture,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureId, EngineError> {
        if prepared.data.is_empty() || prepared.data.len() != prepared.expected_len() {
            return Err(EngineError::Upload("incomplete mip chain".into()));
        }
        let id = TextureId(self.allocate());
        self.textures.insert(id, descriptor.clone());
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, EngineError> {
        let id = ProgramId(self.allocate());
        self.programs.insert(id, source.clone());
        self.compiled.push(id);
        Ok(id)
    }

    fn set_uniform(
        &mut self,
        program: ProgramId,
        name: &str,
        value: UniformValue,
    ) -> Result<(), EngineError> {
        let source = self
            .programs
            .get(&program)
            .ok_or(EngineError::UnknownHandle {
                kind: "program",
                id: program.0,
            })?;
        if source.slot_of(name).is_none() {
            return Err(EngineError::UnknownUniform(name.to_string()));
        }
        self.uniform_writes.push((program, name.to_string(), value));
        Ok(())
    }

    fn surface_metrics(&self) -> SurfaceMetrics {
        self.metrics
    }

    fn configure_surface(&mut self, metrics: SurfaceMetrics) -> Result<(), EngineError> {
        if self.fail_configure_density == Some(metrics.pixel_density) {
            return Err(EngineError::Surface("configuration rejected".into()));
        }
        self.metrics = metrics;
        self.configured.push(metrics);
        Ok(())
    }

    fn submit_frame(&mut self, frame: &FrameDescription) -> Result<(), EngineError> {
        if std::mem::take(&mut self.fail_next_submit) {
            return Err(EngineError::Surface("lost".into()));
        }
        self.frames.push(frame.clone());
        self.frame_metrics = Some(self.metrics);
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<FrameReadback, EngineError> {
        let metrics = self.frame_metrics.ok_or(EngineError::NoFrame)?;
        let (width, height) = metrics.backing_size();
        Ok(FrameReadback {
            width,
            height,
            rgba: vec![128; (width * height * 4) as usize],
        })
    }
}

type Parked = (DecodeRequest, Sender<DecodeCompletion>);

/// Holds decode requests until the test releases them, in any order.
#[derive(Clone, Default)]
pub struct DeferredDecoder {
    parked: Arc<Mutex<Vec<Option<Parked>>>>,
}

impl DeferredDecoder {
    /// Number of requests submitted so far, released or not.
    pub fn pending(&self) -> usize {
        self.parked.lock().unwrap().len()
    }

    /// Runs the request with submission index `index`.
    pub fn complete(&self, index: usize) {
        let parked = self.parked.lock().unwrap()[index].take();
        let (request, completions) = parked.expect("request already completed");
        let _ = completions.send(request.run());
    }

    pub fn complete_all(&self) {
        for index in 0..self.pending() {
            let parked = self.parked.lock().unwrap()[index].take();
            if let Some((request, completions)) = parked {
                let _ = completions.send(request.run());
            }
        }
    }
}

impl DecodeWorker for DeferredDecoder {
    fn submit(&self, request: DecodeRequest, completions: Sender<DecodeCompletion>) {
        self.parked
            .lock()
            .unwrap()
            .push(Some((request, completions)));
    }
}

/// Keeps delivered captures in memory.
#[derive(Default)]
pub struct MemorySink {
    pub delivered: Vec<(PathBuf, Vec<u8>)>,
}

impl CaptureSink for MemorySink {
    fn deliver(&mut self, filename: &Path, png: Vec<u8>) -> Result<PathBuf, ViewerError> {
        self.delivered.push((filename.to_path_buf(), png));
        Ok(filename.to_path_buf())
    }
}
