use crate::coords::{ColorMatrix, Rect};
use crate::warp::Eye;

/// Handle to a color target + framebuffer pair owned by a backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

/// Handle to an uploaded warp mesh buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// Sampling filter used when a target is read as a texture.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

/// Allocation request for a render target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDesc {
    pub width: u32,
    pub height: u32,
    pub filter: Filter,
    pub label: &'static str,
}

impl TargetDesc {
    pub fn new(label: &'static str, width: u32, height: u32, filter: Filter) -> Self {
        Self { width, height, filter, label }
    }
}

/// Geometry of a textured quad draw.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BlitQuad {
    /// Destination rect in pixels of the bound target.
    pub dst: Rect,
    /// Source rect in normalized texture coordinates.
    pub src_uv: Rect,
}

impl BlitQuad {
    /// Covers a whole `width`×`height` destination with the whole source.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            dst: Rect::from_size(width, height),
            src_uv: Rect::UNIT,
        }
    }

    pub fn with_src_uv(mut self, src_uv: Rect) -> Self {
        self.src_uv = src_uv;
        self
    }
}

/// Shader state for a quad draw.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct BlitState {
    pub color_transform: ColorMatrix,
}

/// Shader state for one warp pass.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WarpParams {
    pub eye: Eye,
    /// Use the per-channel distorted coordinates instead of the pass-through set.
    pub distortion: bool,
    /// Fade the lens edge to black.
    pub fog_border: bool,
    /// Sample red/green/blue through their own coordinates (chromatic correction).
    pub dispersion: bool,
    pub color_transform: ColorMatrix,
}
