use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::engine::{
    FrameDescription, FrameReadback, MeshId, PreparedTexture, ProgramId, ProgramSource,
    RenderEngine, SurfaceMetrics, TextureDescriptor, TextureId, UniformSlot, UniformValue, WrapMode,
};
use crate::error::EngineError;
use crate::geometry::MeshData;
use crate::types::CHANNEL_COUNT;

use super::context::GpuContext;
use super::pipeline::{self, PipelineLayouts, DEPTH_FORMAT, SCENE_FORMAT};
use super::readback;
use super::shadow::ContactShadowPass;
use super::textures::{self, GpuTexture};
use super::uniforms::{EffectBlock, FrameBlock};

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    uniforms: Vec<UniformSlot>,
    effects: EffectBlock,
    effect_buffer: wgpu::Buffer,
    effect_bind_group: wgpu::BindGroup,
}

/// Offscreen color and depth at the backing resolution of the current metrics.
struct SceneTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl SceneTarget {
    fn new(device: &wgpu::Device, (width, height): (u32, u32)) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("scene color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SCENE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("scene depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.color.width(), self.color.height())
    }
}

type MaterialKey = ([Option<TextureId>; CHANNEL_COUNT], Option<TextureId>);

/// wgpu implementation of [`RenderEngine`] drawing into a winit window.
///
/// Frames render into an offscreen target sized by the configured
/// [`SurfaceMetrics`] and are then scaled onto the swapchain, so a capture can
/// raise the pixel density without touching the window.
pub struct GpuEngine {
    context: GpuContext,
    layouts: PipelineLayouts,
    metrics: SurfaceMetrics,
    scene: SceneTarget,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    samplers: textures::Samplers,
    contact_shadow: ContactShadowPass,
    material_placeholder: GpuTexture,
    environment_placeholder: GpuTexture,
    background: wgpu::RenderPipeline,
    present: wgpu::RenderPipeline,
    present_sampler: wgpu::Sampler,
    present_bind_group: wgpu::BindGroup,
    material_bind_group: Option<(MaterialKey, wgpu::BindGroup)>,
    meshes: HashMap<MeshId, GpuMesh>,
    textures: HashMap<TextureId, GpuTexture>,
    programs: HashMap<ProgramId, GpuProgram>,
    next_id: u64,
    has_frame: bool,
    window: Arc<Window>,
}

impl GpuEngine {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let physical = window.inner_size();
        let context = GpuContext::new(window.as_ref(), physical)?;
        let metrics = metrics_for(context.size, window.scale_factor());
        let device = &context.device;

        let layouts = PipelineLayouts::new(device);
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame uniforms"),
            size: std::mem::size_of::<FrameBlock>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout: &layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let background = pipeline::build_background_pipeline(device, &layouts)?;
        let contact_shadow = ContactShadowPass::new(device)?;
        let present = pipeline::build_present_pipeline(
            device,
            &layouts,
            context.surface_format,
            context.needs_manual_encoding(),
        )?;
        let present_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("present sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let scene = SceneTarget::new(device, metrics.backing_size());
        let present_bind_group =
            create_present_bind_group(device, &layouts, &scene, &present_sampler);

        let material_placeholder = textures::placeholder(
            device,
            &context.queue,
            "material placeholder",
            wgpu::TextureFormat::Rgba8Unorm,
            WrapMode::Repeat,
        );
        let environment_placeholder = textures::placeholder(
            device,
            &context.queue,
            "environment placeholder",
            wgpu::TextureFormat::Rgba16Float,
            WrapMode::Panorama,
        );

        tracing::info!(
            width = physical.width,
            height = physical.height,
            scale = metrics.pixel_density,
            format = ?context.surface_format,
            "renderer ready"
        );

        Ok(Self {
            samplers: textures::Samplers::new(device),
            contact_shadow,
            layouts,
            metrics,
            scene,
            frame_buffer,
            frame_bind_group,
            material_placeholder,
            environment_placeholder,
            background,
            present,
            present_sampler,
            present_bind_group,
            material_bind_group: None,
            meshes: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            next_id: 0,
            has_frame: false,
            context,
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Follows a window resize or scale change.
    pub fn resize(&mut self, physical: PhysicalSize<u32>, scale_factor: f64) {
        if physical.width == 0 || physical.height == 0 {
            return;
        }
        self.context.resize(physical);
        let metrics = metrics_for(physical, scale_factor);
        if let Err(err) = self.configure_surface(metrics) {
            tracing::warn!(error = %err, "failed to resize scene target");
        }
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn rebuild_scene(&mut self) {
        let size = self.metrics.backing_size();
        if self.scene.size() == size {
            return;
        }
        self.scene = SceneTarget::new(&self.context.device, size);
        self.present_bind_group = create_present_bind_group(
            &self.context.device,
            &self.layouts,
            &self.scene,
            &self.present_sampler,
        );
        self.has_frame = false;
        tracing::debug!(width = size.0, height = size.1, "scene target resized");
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture, EngineError> {
        self.textures.get(&id).ok_or(EngineError::UnknownHandle {
            kind: "texture",
            id: id.0,
        })
    }

    fn ensure_material_bind_group(&mut self, key: MaterialKey) -> Result<(), EngineError> {
        if matches!(&self.material_bind_group, Some((current, _)) if *current == key) {
            return Ok(());
        }
        let (material, environment) = key;
        let mut views = Vec::with_capacity(CHANNEL_COUNT);
        let mut bound_wraps = Vec::with_capacity(CHANNEL_COUNT);
        for slot in material {
            views.push(match slot {
                Some(id) => {
                    let texture = self.texture(id)?;
                    bound_wraps.push(texture.wrap);
                    &texture.view
                }
                None => &self.material_placeholder.view,
            });
        }
        let environment_texture = match environment {
            Some(id) => self.texture(id)?,
            None => &self.environment_placeholder,
        };
        let material_sampler = self.samplers.get(textures::material_wrap(bound_wraps));
        let environment_sampler = self.samplers.get(environment_texture.wrap);

        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: 5,
            resource: wgpu::BindingResource::Sampler(material_sampler),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: 6,
            resource: wgpu::BindingResource::TextureView(&environment_texture.view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: 7,
            resource: wgpu::BindingResource::Sampler(environment_sampler),
        });
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("material bind group"),
                layout: &self.layouts.material,
                entries: &entries,
            });
        self.material_bind_group = Some((key, bind_group));
        Ok(())
    }

    fn acquire_swapchain(&mut self) -> Result<Option<wgpu::SurfaceTexture>, EngineError> {
        match self.context.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::warn!("surface lost or outdated; reconfiguring");
                self.context.reconfigure();
                Ok(None)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                Err(EngineError::Surface("out of memory acquiring frame".into()))
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timeout; skipping present");
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(error = %err, "surface error; skipping present");
                Ok(None)
            }
        }
    }
}

fn metrics_for(physical: PhysicalSize<u32>, scale_factor: f64) -> SurfaceMetrics {
    let scale = if scale_factor.is_finite() && scale_factor > 0.0 {
        scale_factor
    } else {
        1.0
    };
    let logical = physical.to_logical::<f64>(scale);
    SurfaceMetrics::new(
        logical.width.round().max(1.0) as u32,
        logical.height.round().max(1.0) as u32,
        scale as f32,
    )
}

fn create_present_bind_group(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    scene: &SceneTarget,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("present bind group"),
        layout: &layouts.present,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&scene.color_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

impl RenderEngine for GpuEngine {
    fn create_mesh(&mut self, mesh: &MeshData) -> Result<MeshId, EngineError> {
        let device = &self.context.device;
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let id = MeshId(self.allocate());
        self.meshes.insert(
            id,
            GpuMesh {
                vertices,
                indices,
                index_count: mesh.indices.len() as u32,
            },
        );
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
        let texture = textures::upload(
            &self.context.device,
            &self.context.queue,
            prepared,
            descriptor,
            self.context.max_texture_dimension,
        )?;
        let id = TextureId(self.allocate());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, EngineError> {
        let device = &self.context.device;
        let pipeline = pipeline::build_program_pipeline(device, &self.layouts, source)?;
        let effects = EffectBlock::default();
        let effect_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("effect uniforms"),
            contents: bytemuck::bytes_of(&effects),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let effect_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("effect bind group"),
            layout: &self.layouts.effects,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: effect_buffer.as_entire_binding(),
            }],
        });
        let id = ProgramId(self.allocate());
        self.programs.insert(
            id,
            GpuProgram {
                pipeline,
                uniforms: source.uniforms.clone(),
                effects,
                effect_buffer,
                effect_bind_group,
            },
        );
        tracing::debug!(label = %source.label, id = id.0, "program compiled");
        Ok(id)
    }

    fn set_uniform(
        &mut self,
        program: ProgramId,
        name: &str,
        value: UniformValue,
    ) -> Result<(), EngineError> {
        let entry = self
            .programs
            .get_mut(&program)
            .ok_or(EngineError::UnknownHandle {
                kind: "program",
                id: program.0,
            })?;
        let slot = entry
            .uniforms
            .iter()
            .find(|uniform| uniform.name == name)
            .map(|uniform| uniform.slot)
            .ok_or_else(|| EngineError::UnknownUniform(name.to_string()))?;
        if !entry.effects.set(slot, value) {
            return Err(EngineError::UnknownUniform(name.to_string()));
        }
        self.context.queue.write_buffer(
            &entry.effect_buffer,
            0,
            bytemuck::bytes_of(&entry.effects),
        );
        Ok(())
    }

    fn surface_metrics(&self) -> SurfaceMetrics {
        self.metrics
    }

    fn configure_surface(&mut self, metrics: SurfaceMetrics) -> Result<(), EngineError> {
        let (width, height) = metrics.backing_size();
        let limit = self.context.max_texture_dimension;
        if width > limit || height > limit {
            return Err(EngineError::Surface(format!(
                "{width}x{height} exceeds the GPU limit of {limit}"
            )));
        }
        self.metrics = metrics;
        self.rebuild_scene();
        Ok(())
    }

    fn submit_frame(&mut self, frame: &FrameDescription) -> Result<(), EngineError> {
        let environment_lods = frame
            .environment
            .map(|id| self.texture(id).map(|texture| texture.mip_levels))
            .transpose()?;
        self.ensure_material_bind_group((frame.material, frame.environment))?;

        let mesh = self.meshes.get(&frame.mesh).ok_or(EngineError::UnknownHandle {
            kind: "mesh",
            id: frame.mesh.0,
        })?;
        let program = self
            .programs
            .get(&frame.program)
            .ok_or(EngineError::UnknownHandle {
                kind: "program",
                id: frame.program.0,
            })?;
        let material_bind_group = match &self.material_bind_group {
            Some((_, bind_group)) => bind_group,
            None => return Err(EngineError::Surface("material bindings missing".into())),
        };

        let block = FrameBlock::new(frame, environment_lods);
        self.context
            .queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&block));
        let shadowed = frame.uniforms.contact_shadow.enabled;
        if shadowed {
            self.contact_shadow.prepare(&self.context.queue, frame);
        }

        let clear = if block.draws_background() {
            wgpu::Color::BLACK
        } else {
            wgpu::Color {
                r: f64::from(block.background[0]),
                g: f64::from(block.background[1]),
                b: f64::from(block.background[2]),
                a: 1.0,
            }
        };

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                });
        if shadowed {
            self.contact_shadow
                .render(&mut encoder, &mesh.vertices, &mesh.indices, mesh.index_count);
        }
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.scene.color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.scene.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_bind_group(0, &self.frame_bind_group, &[]);
            pass.set_bind_group(1, material_bind_group, &[]);
            if block.draws_background() {
                pass.set_pipeline(&self.background);
                pass.draw(0..3, 0..1);
            }
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(2, &program.effect_bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            if shadowed {
                self.contact_shadow.draw_ground(&mut pass);
            }
        }

        let swapchain = self.acquire_swapchain()?;
        if let Some(surface_texture) = &swapchain {
            let view = surface_texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("present pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.present);
            pass.set_bind_group(0, &self.present_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        if let Some(surface_texture) = swapchain {
            self.window.pre_present_notify();
            surface_texture.present();
        }
        self.has_frame = true;
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<FrameReadback, EngineError> {
        if !self.has_frame {
            return Err(EngineError::NoFrame);
        }
        readback::read_rgba8(&self.context.device, &self.context.queue, &self.scene.color)
    }
}
