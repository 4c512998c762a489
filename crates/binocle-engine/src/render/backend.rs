use std::collections::BTreeMap;

use wgpu::util::DeviceExt;

use crate::backend::{BlitQuad, BlitState, Filter, MeshId, RenderBackend, TargetDesc, TargetId, WarpParams};
use crate::coords::Extent;
use crate::device::Gpu;
use crate::error::BackendError;
use crate::warp::{Eye, EyeMeshVertex};

use super::common::{padded_bytes_per_row, QuadUniform, WarpUniform, TARGET_FORMAT};
use super::pipelines::Pipelines;

const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Usages an imported texture needs to stand in for a backend target,
/// readback included.
const IMPORT_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC);

fn missing_import_usages(usage: wgpu::TextureUsages) -> wgpu::TextureUsages {
    IMPORT_USAGE.difference(usage)
}

struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Extent,
    filter: Filter,
    label: &'static str,
}

impl GpuTarget {
    fn new(device: &wgpu::Device, label: &'static str, size: Extent, filter: Filter) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: TARGET_USAGE,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view, size, filter, label }
    }
}

struct GpuMesh {
    buffer: wgpu::Buffer,
    vertices: u32,
}

/// [`RenderBackend`] on wgpu.
///
/// Targets are `Rgba8Unorm` textures. The default target is a backend-owned
/// "back buffer" texture; presenting it is up to the caller. Draws are
/// recorded into one command encoder that is submitted on readback or
/// [`flush`](Self::flush).
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    pipelines: Option<Pipelines>,
    encoder: Option<wgpu::CommandEncoder>,

    back_buffer: GpuTarget,
    targets: BTreeMap<TargetId, GpuTarget>,
    meshes: BTreeMap<MeshId, GpuMesh>,
    next_target: u32,
    next_mesh: u32,

    bound: Option<TargetId>,
    blending: bool,
}

impl WgpuBackend {
    /// Creates a backend whose default target is `width`×`height`.
    pub fn new(gpu: &Gpu, width: u32, height: u32) -> Self {
        let device = gpu.device().clone();
        let back_buffer = GpuTarget::new(
            &device,
            "binocle back buffer",
            Extent::new(width.max(1), height.max(1)),
            Filter::Nearest,
        );
        Self {
            queue: gpu.queue().clone(),
            device,
            pipelines: None,
            encoder: None,
            back_buffer,
            targets: BTreeMap::new(),
            meshes: BTreeMap::new(),
            next_target: 1,
            next_mesh: 1,
            bound: None,
            blending: false,
        }
    }

    pub fn back_buffer_size(&self) -> Extent {
        self.back_buffer.size
    }

    /// Texture behind a target, e.g. to hand the back buffer to a presenter.
    pub fn texture(&self, target: Option<TargetId>) -> Option<&wgpu::Texture> {
        self.target(target).map(|t| &t.texture)
    }

    /// Submits recorded work.
    pub fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Reads back the default target.
    pub fn read_back_buffer(&mut self, out: &mut Vec<u8>) -> Result<(u32, u32), BackendError> {
        self.read_texture(None, out)
    }

    fn target(&self, id: Option<TargetId>) -> Option<&GpuTarget> {
        match id {
            None => Some(&self.back_buffer),
            Some(id) => self.targets.get(&id),
        }
    }

    fn ensure_pipelines(&mut self) {
        if self.pipelines.is_none() {
            self.pipelines = Some(Pipelines::new(&self.device));
            log::debug!("wgpu pipelines created");
        }
    }

    /// Takes the open encoder, creating one if needed. Put it back with
    /// `self.encoder = Some(..)` once recording is done.
    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        self.encoder.take().unwrap_or_else(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("binocle encoder"),
            })
        })
    }

    fn alloc_target_id(&mut self) -> TargetId {
        let id = TargetId(self.next_target);
        self.next_target += 1;
        id
    }

    /// Bind group for a draw sampling `source`, with its own uniform buffer.
    fn bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        uniform: &[u8],
        source: &GpuTarget,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        let ubo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("binocle draw ubo"),
            contents: uniform,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("binocle draw bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Runs `f` against the open encoder with pipelines ready.
    fn record<F>(&mut self, f: F) -> Result<(), BackendError>
    where
        F: FnOnce(&Self, &mut wgpu::CommandEncoder) -> Result<(), BackendError>,
    {
        self.ensure_pipelines();
        let mut encoder = self.take_encoder();
        let result = f(self, &mut encoder);
        self.encoder = Some(encoder);
        result
    }

    fn encode_quad(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: TargetId,
        quad: &BlitQuad,
        state: &BlitState,
    ) -> Result<(), BackendError> {
        let src = self.targets.get(&source).ok_or(BackendError::UnknownTarget(source))?;
        let dst = self
            .target(self.bound)
            .ok_or_else(|| BackendError::UnknownTarget(self.bound.unwrap_or(source)))?;
        let Some(pipelines) = self.pipelines.as_ref() else { return Ok(()) };

        let uniform = QuadUniform {
            dst: [quad.dst.origin.x, quad.dst.origin.y, quad.dst.size.x, quad.dst.size.y],
            target_size: [dst.size.width as f32, dst.size.height as f32, 0.0, 0.0],
            src_uv: [quad.src_uv.origin.x, quad.src_uv.origin.y, quad.src_uv.size.x, quad.src_uv.size.y],
            color: state.color_transform.to_cols(),
        };
        let bind_group = self.bind_group(
            &pipelines.composite_bgl,
            bytemuck::bytes_of(&uniform),
            src,
            pipelines.sampler(src.filter),
        );

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("binocle composite pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &dst.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        rpass.set_pipeline(pipelines.composite(self.blending));
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.set_vertex_buffer(0, pipelines.quad_vbo.slice(..));
        rpass.set_index_buffer(pipelines.quad_ibo.slice(..), wgpu::IndexFormat::Uint16);
        rpass.draw_indexed(0..6, 0, 0..1);
        Ok(())
    }

    fn encode_warp(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: TargetId,
        mesh: MeshId,
        params: &WarpParams,
    ) -> Result<(), BackendError> {
        let src = self.targets.get(&source).ok_or(BackendError::UnknownTarget(source))?;
        let gpu_mesh = self.meshes.get(&mesh).ok_or(BackendError::UnknownMesh(mesh))?;
        let dst = self
            .target(self.bound)
            .ok_or_else(|| BackendError::UnknownTarget(self.bound.unwrap_or(source)))?;
        let Some(pipelines) = self.pipelines.as_ref() else { return Ok(()) };

        let flag = |on: bool| u32::from(on);
        let uniform = WarpUniform {
            target_size: [dst.size.width as f32, dst.size.height as f32, 0.0, 0.0],
            flags: [
                flag(params.eye == Eye::Right),
                flag(params.distortion),
                flag(params.fog_border),
                flag(params.dispersion),
            ],
            color: params.color_transform.to_cols(),
        };
        // Eye buffers are always sampled linearly in the warp pass.
        let bind_group = self.bind_group(
            &pipelines.warp_bgl,
            bytemuck::bytes_of(&uniform),
            src,
            pipelines.sampler(Filter::Linear),
        );

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("binocle warp pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &dst.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        rpass.set_pipeline(pipelines.warp(self.blending));
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.set_vertex_buffer(0, gpu_mesh.buffer.slice(..));
        rpass.draw(0..gpu_mesh.vertices, 0..1);
        Ok(())
    }

    fn read_texture(
        &mut self,
        id: Option<TargetId>,
        out: &mut Vec<u8>,
    ) -> Result<(u32, u32), BackendError> {
        let Some(t) = self.target(id) else {
            return Err(BackendError::UnknownTarget(id.unwrap_or(TargetId(0))));
        };
        let texture = t.texture.clone();
        let Extent { width, height } = t.size;
        let padded = padded_bytes_per_row(width);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("binocle readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.take_encoder();
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.encoder = Some(encoder);
        self.flush();

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BackendError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| BackendError::Readback(e.to_string()))?
            .map_err(|e| BackendError::Readback(e.to_string()))?;

        {
            let mapped = slice.get_mapped_range();
            let row = (width * 4) as usize;
            out.clear();
            out.reserve(row * height as usize);
            for y in 0..height as usize {
                let start = y * padded as usize;
                out.extend_from_slice(&mapped[start..start + row]);
            }
        }
        staging.unmap();
        Ok((width, height))
    }
}

impl RenderBackend for WgpuBackend {
    type ExternalImage = wgpu::Texture;

    fn create_target(&mut self, desc: &TargetDesc) -> Result<TargetId, BackendError> {
        let size = Extent::new(desc.width, desc.height);
        let max = self.device.limits().max_texture_dimension_2d;
        if !size.is_valid() || size.width > max || size.height > max {
            return Err(BackendError::IncompleteTarget { width: desc.width, height: desc.height });
        }
        let id = self.alloc_target_id();
        self.targets.insert(id, GpuTarget::new(&self.device, desc.label, size, desc.filter));
        Ok(id)
    }

    fn resize_target(&mut self, id: TargetId, width: u32, height: u32) -> Result<(), BackendError> {
        let max = self.device.limits().max_texture_dimension_2d;
        let t = self.targets.get_mut(&id).ok_or(BackendError::UnknownTarget(id))?;
        let size = Extent::new(width, height);
        if !size.is_valid() || width > max || height > max {
            return Err(BackendError::IncompleteTarget { width, height });
        }
        *t = GpuTarget::new(&self.device, t.label, size, t.filter);
        Ok(())
    }

    fn release_target(&mut self, id: TargetId) {
        if self.targets.remove(&id).is_some() && self.bound == Some(id) {
            self.bound = None;
        }
    }

    fn target_size(&self, id: TargetId) -> Option<(u32, u32)> {
        self.targets.get(&id).map(|t| (t.size.width, t.size.height))
    }

    fn bind_target(&mut self, target: Option<TargetId>) {
        self.bound = target;
    }

    fn bound_target(&self) -> Option<TargetId> {
        self.bound
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        let mut encoder = self.take_encoder();
        if let Some(target) = self.target(self.bound) {
            let [r, g, b, a] = rgba.map(f64::from);
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("binocle clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.encoder = Some(encoder);
    }

    fn set_blending(&mut self, enabled: bool) {
        self.blending = enabled;
    }

    fn draw_quad(&mut self, source: TargetId, quad: &BlitQuad, state: &BlitState) -> Result<(), BackendError> {
        if self.bound == Some(source) {
            log::warn!("quad draw samples its own target {source:?}; skipped");
            return Ok(());
        }
        self.record(|this, encoder| this.encode_quad(encoder, source, quad, state))
    }

    fn upload_mesh(&mut self, vertices: &[EyeMeshVertex]) -> Result<MeshId, BackendError> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("binocle warp mesh"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let id = MeshId(self.next_mesh);
        self.next_mesh += 1;
        self.meshes.insert(id, GpuMesh { buffer, vertices: vertices.len() as u32 });
        Ok(id)
    }

    fn release_mesh(&mut self, id: MeshId) {
        self.meshes.remove(&id);
    }

    fn draw_warp(&mut self, source: TargetId, mesh: MeshId, params: &WarpParams) -> Result<(), BackendError> {
        if self.bound == Some(source) {
            log::warn!("warp draw samples its own target {source:?}; skipped");
            return Ok(());
        }
        self.record(|this, encoder| this.encode_warp(encoder, source, mesh, params))
    }

    fn read_pixels(&mut self, source: TargetId, out: &mut Vec<u8>) -> Result<(u32, u32), BackendError> {
        if !self.targets.contains_key(&source) {
            return Err(BackendError::UnknownTarget(source));
        }
        self.read_texture(Some(source), out)
    }

    fn import_image(&mut self, image: &wgpu::Texture) -> Result<TargetId, BackendError> {
        if image.format() != TARGET_FORMAT {
            return Err(BackendError::Import(format!("unsupported format {:?}", image.format())));
        }
        let missing = missing_import_usages(image.usage());
        if !missing.is_empty() {
            return Err(BackendError::Import(format!("missing usages {missing:?}")));
        }
        let size = Extent::new(image.width(), image.height());
        let id = self.alloc_target_id();
        let target = GpuTarget {
            view: image.create_view(&wgpu::TextureViewDescriptor::default()),
            texture: image.clone(),
            size,
            filter: Filter::Nearest,
            label: "imported image",
        };
        self.targets.insert(id, target);
        log::debug!("imported {}x{} image as {id:?}", size.width, size.height);
        Ok(id)
    }

    fn live_targets(&self) -> usize {
        self.targets.len()
    }
}
