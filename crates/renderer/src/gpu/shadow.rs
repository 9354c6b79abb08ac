//! Contact shadow under the model.
//!
//! The mesh is rendered from below into a small target with darkness fading
//! over `far`, blurred horizontally then vertically, and finally laid over a
//! ground quad at the end of the scene pass.
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use wgpu::naga::ShaderStage;
use wgpu::util::DeviceExt;

use crate::engine::FrameDescription;
use crate::error::EngineError;
use crate::geometry::MeshVertex;
use crate::shader::glsl::{
    GROUND_FRAGMENT, GROUND_VERTEX, SHADOW_BLOCK, SHADOW_BLUR_FRAGMENT, SHADOW_CASTER_FRAGMENT,
    SHADOW_CASTER_VERTEX,
};
use crate::types::ContactShadow;

use super::pipeline::{self, DEPTH_FORMAT, MESH_ATTRIBUTES, SCENE_FORMAT};

const SHADOW_RESOLUTION: u32 = 512;
const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Keeps the darkest caster per texel.
const MAX_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Max,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Max,
    },
};

/// World space to shadow clip space.
///
/// X and Z span the ground square onto [-1, 1]; height above the plane maps
/// onto depth [0, 1] over `far`, so anything below the plane or beyond `far`
/// is clipped away.
pub(crate) fn shadow_matrix(shadow: &ContactShadow) -> Mat4 {
    let half = (shadow.scale * 0.5).max(f32::EPSILON);
    let far = shadow.far.max(f32::EPSILON);
    Mat4::from_cols(
        Vec4::new(1.0 / half, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0 / far, 0.0),
        Vec4::new(0.0, 1.0 / half, 0.0, 0.0),
        Vec4::new(0.0, 0.0, -shadow.height / far, 1.0),
    )
}

/// Distance between blur taps in shadow-target uv.
pub(crate) fn blur_step(shadow: &ContactShadow) -> f32 {
    shadow.blur.max(0.0) / (SHADOW_RESOLUTION / 2) as f32
}

/// std140 mirror of the `ShadowParams` block.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ShadowBlock {
    pub model: [[f32; 4]; 4],
    pub shadow_matrix: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub params: [f32; 4],
}

unsafe impl Zeroable for ShadowBlock {}
unsafe impl Pod for ShadowBlock {}

impl ShadowBlock {
    pub fn new(frame: &FrameDescription) -> Self {
        let shadow = &frame.uniforms.contact_shadow;
        Self {
            model: frame.model.to_cols_array_2d(),
            shadow_matrix: shadow_matrix(shadow).to_cols_array_2d(),
            view_projection: (frame.projection * frame.view).to_cols_array_2d(),
            params: [
                shadow.opacity.clamp(0.0, 1.0),
                blur_step(shadow),
                shadow.scale,
                shadow.height,
            ],
        }
    }
}

/// std140 mirror of the `BlurParams` block.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct BlurBlock {
    pub direction: [f32; 4],
}

unsafe impl Zeroable for BlurBlock {}
unsafe impl Pod for BlurBlock {}

const _: () = assert!(std::mem::size_of::<ShadowBlock>() == 3 * 64 + 16);

pub(crate) struct ContactShadowPass {
    caster: wgpu::RenderPipeline,
    blur: wgpu::RenderPipeline,
    ground: wgpu::RenderPipeline,
    shadow_buffer: wgpu::Buffer,
    horizontal_buffer: wgpu::Buffer,
    vertical_buffer: wgpu::Buffer,
    caster_bind_group: wgpu::BindGroup,
    horizontal_bind_group: wgpu::BindGroup,
    vertical_bind_group: wgpu::BindGroup,
    ground_bind_group: wgpu::BindGroup,
    _target: wgpu::Texture,
    target_view: wgpu::TextureView,
    _scratch: wgpu::Texture,
    scratch_view: wgpu::TextureView,
}

impl ContactShadowPass {
    pub fn new(device: &wgpu::Device) -> Result<Self, EngineError> {
        let caster_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow caster layout"),
            entries: &[pipeline::uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });
        let sample_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow sample layout"),
            entries: &[
                pipeline::uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                pipeline::texture_entry(1, wgpu::ShaderStages::FRAGMENT),
                pipeline::sampler_entry(2, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let (target, target_view) = shadow_target(device, "shadow target");
        let (scratch, scratch_view) = shadow_target(device, "shadow scratch");
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let shadow_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow uniforms"),
            size: std::mem::size_of::<ShadowBlock>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let blur_buffer = |label| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&BlurBlock::default()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        };
        let horizontal_buffer = blur_buffer("shadow blur horizontal");
        let vertical_buffer = blur_buffer("shadow blur vertical");

        let caster_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow caster bind group"),
            layout: &caster_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: shadow_buffer.as_entire_binding(),
            }],
        });
        let sample_group = |label, uniforms: &wgpu::Buffer, view: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &sample_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            })
        };
        // target -> scratch -> target, then the ground samples the target.
        let horizontal_bind_group =
            sample_group("shadow blur horizontal", &horizontal_buffer, &target_view);
        let vertical_bind_group =
            sample_group("shadow blur vertical", &vertical_buffer, &scratch_view);
        let ground_bind_group = sample_group("shadow ground", &shadow_buffer, &target_view);

        Ok(Self {
            caster: build_caster_pipeline(device, &caster_layout)?,
            blur: build_blur_pipeline(device, &sample_layout)?,
            ground: build_ground_pipeline(device, &sample_layout)?,
            shadow_buffer,
            horizontal_buffer,
            vertical_buffer,
            caster_bind_group,
            horizontal_bind_group,
            vertical_bind_group,
            ground_bind_group,
            _target: target,
            target_view,
            _scratch: scratch,
            scratch_view,
        })
    }

    pub fn prepare(&self, queue: &wgpu::Queue, frame: &FrameDescription) {
        let block = ShadowBlock::new(frame);
        queue.write_buffer(&self.shadow_buffer, 0, bytemuck::bytes_of(&block));
        let step = block.params[1];
        let horizontal = BlurBlock {
            direction: [step, 0.0, 0.0, 0.0],
        };
        let vertical = BlurBlock {
            direction: [0.0, step, 0.0, 0.0],
        };
        queue.write_buffer(&self.horizontal_buffer, 0, bytemuck::bytes_of(&horizontal));
        queue.write_buffer(&self.vertical_buffer, 0, bytemuck::bytes_of(&vertical));
    }

    /// Renders and blurs the shadow target; call before the scene pass.
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        vertices: &wgpu::Buffer,
        indices: &wgpu::Buffer,
        index_count: u32,
    ) {
        {
            let mut pass = begin_target_pass(encoder, "shadow caster pass", &self.target_view);
            pass.set_pipeline(&self.caster);
            pass.set_bind_group(0, &self.caster_bind_group, &[]);
            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..index_count, 0, 0..1);
        }
        for (label, target, bind_group) in [
            ("shadow blur horizontal pass", &self.scratch_view, &self.horizontal_bind_group),
            ("shadow blur vertical pass", &self.target_view, &self.vertical_bind_group),
        ] {
            let mut pass = begin_target_pass(encoder, label, target);
            pass.set_pipeline(&self.blur);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    /// Composites the blurred shadow onto the ground quad inside the scene pass.
    pub fn draw_ground(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.ground);
        pass.set_bind_group(0, &self.ground_bind_group, &[]);
        pass.draw(0..6, 0..1);
    }
}

fn shadow_target(device: &wgpu::Device, label: &str) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: SHADOW_RESOLUTION,
            height: SHADOW_RESOLUTION,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: SHADOW_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn begin_target_pass<'encoder>(
    encoder: &'encoder mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
) -> wgpu::RenderPass<'encoder> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    })
}

fn build_caster_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::RenderPipeline, EngineError> {
    let vertex = pipeline::compile_module(
        device,
        "shadow caster vertex",
        format!("#version 450\n{SHADOW_BLOCK}{SHADOW_CASTER_VERTEX}"),
        ShaderStage::Vertex,
    )?;
    let fragment = pipeline::compile_module(
        device,
        "shadow caster fragment",
        SHADOW_CASTER_FRAGMENT.to_string(),
        ShaderStage::Fragment,
    )?;
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("shadow caster"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("shadow caster"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex,
            entry_point: Some("main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &MESH_ATTRIBUTES,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: SHADOW_FORMAT,
                blend: Some(MAX_BLEND),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    }))
}

fn build_blur_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::RenderPipeline, EngineError> {
    let fragment = pipeline::compile_module(
        device,
        "shadow blur fragment",
        SHADOW_BLUR_FRAGMENT.to_string(),
        ShaderStage::Fragment,
    )?;
    pipeline::fullscreen_pipeline(
        device,
        "shadow blur",
        &[layout],
        &fragment,
        SHADOW_FORMAT,
        None,
    )
}

fn build_ground_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::RenderPipeline, EngineError> {
    let vertex = pipeline::compile_module(
        device,
        "ground vertex",
        format!("#version 450\n{SHADOW_BLOCK}{GROUND_VERTEX}"),
        ShaderStage::Vertex,
    )?;
    let fragment = pipeline::compile_module(
        device,
        "ground fragment",
        format!("#version 450\n{SHADOW_BLOCK}{GROUND_FRAGMENT}"),
        ShaderStage::Fragment,
    )?;
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("shadow ground"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("shadow ground"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: SCENE_FORMAT,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    }))
}
