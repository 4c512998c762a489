//! CPU implementation of [`RenderBackend`] for tests and tooling.
//!
//! Targets are plain RGBA8 buffers. Quad draws are rasterized with
//! nearest-neighbour sampling, which is enough to exercise readback-driven
//! logic without a GPU. Warp draws are only recorded.

use std::collections::{BTreeMap, BTreeSet};

use crate::coords::{ColorMatrix, Extent};
use crate::error::BackendError;
use crate::warp::EyeMeshVertex;

use super::{BlitQuad, BlitState, Filter, MeshId, RenderBackend, TargetDesc, TargetId, WarpParams};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTarget { id: TargetId, width: u32, height: u32 },
    ResizeTarget { id: TargetId, width: u32, height: u32 },
    ReleaseTarget(TargetId),
    Bind(Option<TargetId>),
    Clear { target: Option<TargetId>, rgba: [f32; 4] },
    Blending(bool),
    Quad {
        source: TargetId,
        target: Option<TargetId>,
        blending: bool,
        color_transform: ColorMatrix,
    },
    UploadMesh { id: MeshId, vertices: usize },
    ReleaseMesh(MeshId),
    Warp { source: TargetId, mesh: MeshId, target: Option<TargetId>, params: WarpParams },
    ReadPixels(TargetId),
    Import { id: TargetId, width: u32, height: u32 },
}

#[derive(Debug, Clone)]
struct CpuTarget {
    width: u32,
    height: u32,
    filter: Filter,
    imported: bool,
    pixels: Vec<u8>,
}

impl CpuTarget {
    fn new(width: u32, height: u32, filter: Filter) -> Self {
        Self {
            width,
            height,
            filter,
            imported: false,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }
}

/// Recording CPU backend.
#[derive(Debug)]
pub struct RecordingBackend {
    default_target: CpuTarget,
    targets: BTreeMap<TargetId, CpuTarget>,
    meshes: BTreeSet<MeshId>,
    next_target: u32,
    next_mesh: u32,
    bound: Option<TargetId>,
    blending: bool,
    /// Allocations left to succeed before one fails.
    fail_allocation_in: Option<usize>,
    commands: Vec<Command>,
}

impl RecordingBackend {
    /// Creates a backend whose default target is `width`×`height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            default_target: CpuTarget::new(width, height, Filter::Nearest),
            targets: BTreeMap::new(),
            meshes: BTreeSet::new(),
            next_target: 1,
            next_mesh: 1,
            bound: None,
            blending: false,
            fail_allocation_in: None,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Makes the next `create_target` report an incomplete target.
    pub fn fail_next_allocation(&mut self) {
        self.fail_allocation_after(0);
    }

    /// Lets `successes` more `create_target` calls through, then fails one.
    pub fn fail_allocation_after(&mut self, successes: usize) {
        self.fail_allocation_in = Some(successes);
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn filter(&self, id: TargetId) -> Option<Filter> {
        self.targets.get(&id).map(|t| t.filter)
    }

    /// Raw pixels of a target; `None` selects the default target.
    pub fn pixels(&self, target: Option<TargetId>) -> Option<&[u8]> {
        match target {
            None => Some(&self.default_target.pixels),
            Some(id) => self.targets.get(&id).map(|t| t.pixels.as_slice()),
        }
    }

    /// Overwrites a target's pixels with a generated image.
    pub fn paint(&mut self, id: TargetId, mut f: impl FnMut(u32, u32) -> [u8; 4]) {
        let Some(t) = self.targets.get_mut(&id) else { return };
        for y in 0..t.height {
            for x in 0..t.width {
                let i = ((y * t.width + x) * 4) as usize;
                t.pixels[i..i + 4].copy_from_slice(&f(x, y));
            }
        }
    }

    fn target_mut(&mut self, target: Option<TargetId>) -> Option<&mut CpuTarget> {
        match target {
            None => Some(&mut self.default_target),
            Some(id) => self.targets.get_mut(&id),
        }
    }

    fn alloc_target_id(&mut self) -> TargetId {
        let id = TargetId(self.next_target);
        self.next_target += 1;
        id
    }
}

fn to_unit(c: [u8; 4]) -> [f32; 4] {
    c.map(|v| f32::from(v) / 255.0)
}

fn to_byte(c: [f32; 4]) -> [u8; 4] {
    c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

impl RenderBackend for RecordingBackend {
    type ExternalImage = Extent;

    fn create_target(&mut self, desc: &TargetDesc) -> Result<TargetId, BackendError> {
        let injected = match self.fail_allocation_in {
            Some(0) => {
                self.fail_allocation_in = None;
                true
            }
            Some(n) => {
                self.fail_allocation_in = Some(n - 1);
                false
            }
            None => false,
        };
        if injected || desc.width == 0 || desc.height == 0 {
            return Err(BackendError::IncompleteTarget { width: desc.width, height: desc.height });
        }
        let id = self.alloc_target_id();
        self.targets
            .insert(id, CpuTarget::new(desc.width, desc.height, desc.filter));
        self.commands.push(Command::CreateTarget { id, width: desc.width, height: desc.height });
        Ok(id)
    }

    fn resize_target(&mut self, id: TargetId, width: u32, height: u32) -> Result<(), BackendError> {
        let t = self.targets.get_mut(&id).ok_or(BackendError::UnknownTarget(id))?;
        if width == 0 || height == 0 {
            return Err(BackendError::IncompleteTarget { width, height });
        }
        *t = CpuTarget { imported: t.imported, ..CpuTarget::new(width, height, t.filter) };
        self.commands.push(Command::ResizeTarget { id, width, height });
        Ok(())
    }

    fn release_target(&mut self, id: TargetId) {
        if self.targets.remove(&id).is_some() {
            if self.bound == Some(id) {
                self.bound = None;
            }
            self.commands.push(Command::ReleaseTarget(id));
        }
    }

    fn target_size(&self, id: TargetId) -> Option<(u32, u32)> {
        self.targets.get(&id).map(|t| (t.width, t.height))
    }

    fn bind_target(&mut self, target: Option<TargetId>) {
        self.bound = target;
        self.commands.push(Command::Bind(target));
    }

    fn bound_target(&self) -> Option<TargetId> {
        self.bound
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        let bound = self.bound;
        let byte = to_byte(rgba);
        if let Some(t) = self.target_mut(bound) {
            for px in t.pixels.chunks_exact_mut(4) {
                px.copy_from_slice(&byte);
            }
        }
        self.commands.push(Command::Clear { target: bound, rgba });
    }

    fn set_blending(&mut self, enabled: bool) {
        self.blending = enabled;
        self.commands.push(Command::Blending(enabled));
    }

    fn draw_quad(
        &mut self,
        source: TargetId,
        quad: &BlitQuad,
        state: &BlitState,
    ) -> Result<(), BackendError> {
        let src = self.targets.get(&source).ok_or(BackendError::UnknownTarget(source))?.clone();
        let bound = self.bound;
        let blending = self.blending;
        let dst = self
            .target_mut(bound)
            .ok_or_else(|| BackendError::UnknownTarget(bound.unwrap_or(source)))?;

        let x0 = quad.dst.origin.x.max(0.0) as u32;
        let y0 = quad.dst.origin.y.max(0.0) as u32;
        let x1 = (quad.dst.max().x.max(0.0) as u32).min(dst.width);
        let y1 = (quad.dst.max().y.max(0.0) as u32).min(dst.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let fx = (x as f32 + 0.5 - quad.dst.origin.x) / quad.dst.size.x;
                let fy = (y as f32 + 0.5 - quad.dst.origin.y) / quad.dst.size.y;
                let u = quad.src_uv.origin.x + quad.src_uv.size.x * fx;
                let v = quad.src_uv.origin.y + quad.src_uv.size.y * fy;
                let sx = ((u * src.width as f32) as u32).min(src.width - 1);
                let sy = ((v * src.height as f32) as u32).min(src.height - 1);

                let color = state.color_transform.apply(to_unit(src.texel(sx, sy)));
                let i = ((y * dst.width + x) * 4) as usize;
                let out = if blending {
                    let under = to_unit([dst.pixels[i], dst.pixels[i + 1], dst.pixels[i + 2], dst.pixels[i + 3]]);
                    let a = color[3];
                    [0, 1, 2, 3].map(|c| color[c] + under[c] * (1.0 - a))
                } else {
                    color
                };
                dst.pixels[i..i + 4].copy_from_slice(&to_byte(out));
            }
        }

        self.commands.push(Command::Quad {
            source,
            target: bound,
            blending,
            color_transform: state.color_transform,
        });
        Ok(())
    }

    fn upload_mesh(&mut self, vertices: &[EyeMeshVertex]) -> Result<MeshId, BackendError> {
        let id = MeshId(self.next_mesh);
        self.next_mesh += 1;
        self.meshes.insert(id);
        self.commands.push(Command::UploadMesh { id, vertices: vertices.len() });
        Ok(id)
    }

    fn release_mesh(&mut self, id: MeshId) {
        if self.meshes.remove(&id) {
            self.commands.push(Command::ReleaseMesh(id));
        }
    }

    fn draw_warp(
        &mut self,
        source: TargetId,
        mesh: MeshId,
        params: &WarpParams,
    ) -> Result<(), BackendError> {
        if !self.targets.contains_key(&source) {
            return Err(BackendError::UnknownTarget(source));
        }
        if !self.meshes.contains(&mesh) {
            return Err(BackendError::UnknownMesh(mesh));
        }
        self.commands.push(Command::Warp { source, mesh, target: self.bound, params: *params });
        Ok(())
    }

    fn read_pixels(
        &mut self,
        source: TargetId,
        out: &mut Vec<u8>,
    ) -> Result<(u32, u32), BackendError> {
        let t = self.targets.get(&source).ok_or(BackendError::UnknownTarget(source))?;
        out.clear();
        out.extend_from_slice(&t.pixels);
        let size = (t.width, t.height);
        self.commands.push(Command::ReadPixels(source));
        Ok(size)
    }

    fn import_image(&mut self, image: &Extent) -> Result<TargetId, BackendError> {
        if !image.is_valid() {
            return Err(BackendError::Import(format!("empty image {image:?}")));
        }
        let id = self.alloc_target_id();
        let mut t = CpuTarget::new(image.width, image.height, Filter::Nearest);
        t.imported = true;
        self.targets.insert(id, t);
        self.commands.push(Command::Import { id, width: image.width, height: image.height });
        Ok(id)
    }

    fn live_targets(&self) -> usize {
        self.targets.len()
    }
}
