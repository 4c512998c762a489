use wgpu::util::DeviceExt;

use crate::backend::Filter;

use super::common::{
    mesh_layout, premul_alpha_blend, QuadUniform, QuadVertex, WarpUniform, QUAD_INDICES,
    QUAD_VERTICES, TARGET_FORMAT,
};

/// Pipelines, layouts and static buffers, created together on first draw.
pub(super) struct Pipelines {
    pub composite_opaque: wgpu::RenderPipeline,
    pub composite_blend: wgpu::RenderPipeline,
    pub warp_opaque: wgpu::RenderPipeline,
    pub warp_blend: wgpu::RenderPipeline,

    pub composite_bgl: wgpu::BindGroupLayout,
    pub warp_bgl: wgpu::BindGroupLayout,

    pub nearest: wgpu::Sampler,
    pub linear: wgpu::Sampler,

    pub quad_vbo: wgpu::Buffer,
    pub quad_ibo: wgpu::Buffer,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("binocle composite shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/composite.wgsl").into()),
        });
        let warp_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("binocle warp shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/warp.wgsl").into()),
        });

        let composite_bgl = texture_bgl(device, "binocle composite bgl", uniform_size::<QuadUniform>());
        let warp_bgl = texture_bgl(device, "binocle warp bgl", uniform_size::<WarpUniform>());

        let composite = |blend| {
            pipeline(
                device,
                "binocle composite pipeline",
                &composite_shader,
                &composite_bgl,
                QuadVertex::layout(),
                blend,
            )
        };
        let warp = |blend| {
            pipeline(device, "binocle warp pipeline", &warp_shader, &warp_bgl, mesh_layout(), blend)
        };

        Self {
            composite_opaque: composite(None),
            composite_blend: composite(Some(premul_alpha_blend())),
            warp_opaque: warp(None),
            warp_blend: warp(Some(premul_alpha_blend())),
            nearest: sampler(device, wgpu::FilterMode::Nearest),
            linear: sampler(device, wgpu::FilterMode::Linear),
            quad_vbo: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("binocle quad vbo"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            quad_ibo: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("binocle quad ibo"),
                contents: bytemuck::cast_slice(&QUAD_INDICES),
                usage: wgpu::BufferUsages::INDEX,
            }),
            composite_bgl,
            warp_bgl,
        }
    }

    pub fn composite(&self, blending: bool) -> &wgpu::RenderPipeline {
        if blending { &self.composite_blend } else { &self.composite_opaque }
    }

    pub fn warp(&self, blending: bool) -> &wgpu::RenderPipeline {
        if blending { &self.warp_blend } else { &self.warp_opaque }
    }

    pub fn sampler(&self, filter: Filter) -> &wgpu::Sampler {
        match filter {
            Filter::Nearest => &self.nearest,
            Filter::Linear => &self.linear,
        }
    }
}

fn uniform_size<T>() -> Option<std::num::NonZeroU64> {
    std::num::NonZeroU64::new(std::mem::size_of::<T>() as u64)
}

/// Uniform at 0, filterable texture at 1, sampler at 2.
fn texture_bgl(
    device: &wgpu::Device,
    label: &'static str,
    min_binding_size: Option<std::num::NonZeroU64>,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn pipeline(
    device: &wgpu::Device,
    label: &'static str,
    shader: &wgpu::ShaderModule,
    bgl: &wgpu::BindGroupLayout,
    vertex_layout: wgpu::VertexBufferLayout<'static>,
    blend: Option<wgpu::BlendState>,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bgl],
        immediate_size: 0,
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[vertex_layout],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

fn sampler(device: &wgpu::Device, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("binocle target sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}
