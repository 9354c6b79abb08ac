use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::engine::ProgramSource;
use crate::error::EngineError;
use crate::geometry::MeshVertex;
use crate::shader::glsl::{
    BACKGROUND_FRAGMENT, ENVIRONMENT_BLOCK, FRAME_BLOCK, FULLSCREEN_VERTEX, PRESENT_FRAGMENT,
};

pub(crate) const SCENE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Bind group layouts shared by every pipeline.
pub(crate) struct PipelineLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub effects: wgpu::BindGroupLayout,
    pub present: wgpu::BindGroupLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });

        // 0..=4 material maps, 5 material sampler, 6 environment, 7 environment sampler.
        let mut material_entries = Vec::with_capacity(8);
        for binding in 0..4 {
            material_entries.push(texture_entry(binding, wgpu::ShaderStages::FRAGMENT));
        }
        material_entries.push(texture_entry(4, wgpu::ShaderStages::VERTEX_FRAGMENT));
        material_entries.push(sampler_entry(5, wgpu::ShaderStages::VERTEX_FRAGMENT));
        material_entries.push(texture_entry(6, wgpu::ShaderStages::FRAGMENT));
        material_entries.push(sampler_entry(7, wgpu::ShaderStages::FRAGMENT));
        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material layout"),
            entries: &material_entries,
        });

        let effects = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("effect layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::FRAGMENT)],
        });

        let present = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("present layout"),
            entries: &[
                texture_entry(0, wgpu::ShaderStages::FRAGMENT),
                sampler_entry(1, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        Self {
            frame,
            material,
            effects,
            present,
        }
    }
}

pub(crate) fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn texture_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn sampler_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Compiles GLSL, turning validation failures into [`EngineError::Compile`].
pub(crate) fn compile_module(
    device: &wgpu::Device,
    label: &str,
    source: String,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule, EngineError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source),
            stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(EngineError::Compile {
            label: label.to_string(),
            message: error.to_string(),
        }),
        None => Ok(module),
    }
}

fn scene_depth_state(write: bool) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: if write {
            wgpu::CompareFunction::Less
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

fn opaque_target(format: wgpu::TextureFormat) -> [Option<wgpu::ColorTargetState>; 1] {
    [Some(wgpu::ColorTargetState {
        format,
        blend: None,
        write_mask: wgpu::ColorWrites::ALL,
    })]
}

pub(crate) const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

/// Mesh pipeline for one composed program variant.
///
/// Back faces are rasterised and discarded in the fragment stage unless the
/// frame marks the material double-sided, so toggling needs no rebuild.
pub(crate) fn build_program_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    source: &ProgramSource,
) -> Result<wgpu::RenderPipeline, EngineError> {
    let vertex = compile_module(
        device,
        &format!("{} vertex", source.label),
        source.vertex.clone(),
        ShaderStage::Vertex,
    )?;
    let fragment = compile_module(
        device,
        &format!("{} fragment", source.label),
        source.fragment.clone(),
        ShaderStage::Fragment,
    )?;

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&source.label),
        bind_group_layouts: &[&layouts.frame, &layouts.material, &layouts.effects],
        push_constant_ranges: &[],
    });

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&source.label),
        layout: Some(&layout),
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
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(scene_depth_state(true)),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment,
            entry_point: Some("main"),
            targets: &opaque_target(SCENE_FORMAT),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(EngineError::Compile {
            label: source.label.clone(),
            message: error.to_string(),
        }),
        None => Ok(pipeline),
    }
}

pub(crate) fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    fragment: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    depth_stencil: Option<wgpu::DepthStencilState>,
) -> Result<wgpu::RenderPipeline, EngineError> {
    let vertex = compile_module(
        device,
        "fullscreen vertex",
        FULLSCREEN_VERTEX.to_string(),
        ShaderStage::Vertex,
    )?;
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    });
    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &opaque_target(format),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    }))
}

/// Environment backdrop drawn into the scene target before the mesh.
pub(crate) fn build_background_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
) -> Result<wgpu::RenderPipeline, EngineError> {
    let source = format!("#version 450\n{FRAME_BLOCK}{ENVIRONMENT_BLOCK}{BACKGROUND_FRAGMENT}");
    let fragment = compile_module(device, "background fragment", source, ShaderStage::Fragment)?;
    fullscreen_pipeline(
        device,
        "background pipeline",
        &[&layouts.frame, &layouts.material],
        &fragment,
        SCENE_FORMAT,
        Some(scene_depth_state(false)),
    )
}

/// Copies the scene target to the swapchain, encoding gamma when the
/// swapchain format cannot.
pub(crate) fn build_present_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    surface_format: wgpu::TextureFormat,
    encode_srgb: bool,
) -> Result<wgpu::RenderPipeline, EngineError> {
    let source = if encode_srgb {
        PRESENT_FRAGMENT.replacen("#version 450\n", "#version 450\n#define ENCODE_SRGB\n", 1)
    } else {
        PRESENT_FRAGMENT.to_string()
    };
    let fragment = compile_module(device, "present fragment", source, ShaderStage::Fragment)?;
    fullscreen_pipeline(
        device,
        "present pipeline",
        &[&layouts.present],
        &fragment,
        surface_format,
        None,
    )
}
