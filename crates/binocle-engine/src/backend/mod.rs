//! Rendering backend abstraction.
//!
//! The compositing core never talks to a graphics API directly. It sequences
//! calls on a [`RenderBackend`], which owns the actual textures, framebuffers
//! and pipelines. Two implementations ship with the crate:
//! - [`crate::render::WgpuBackend`] for real GPUs
//! - [`recording::RecordingBackend`], a CPU rasterizer used by tests
//!
//! Convention:
//! - targets are RGBA8, addressed by opaque [`TargetId`] handles
//! - `None` as a bound target means the default (back buffer) target

pub mod recording;
mod types;

pub use types::{BlitQuad, BlitState, Filter, MeshId, TargetDesc, TargetId, WarpParams};

use crate::error::BackendError;
use crate::warp::EyeMeshVertex;

/// Capabilities the compositor consumes from the graphics layer.
pub trait RenderBackend {
    /// Platform image type that can be wrapped as a render target.
    type ExternalImage;

    /// Allocates a color target with its framebuffer.
    ///
    /// # Errors
    /// `BackendError::IncompleteTarget` if the target cannot be completed.
    fn create_target(&mut self, desc: &TargetDesc) -> Result<TargetId, BackendError>;

    /// Reallocates the storage of an existing target in place.
    ///
    /// The handle stays valid; previous contents are undefined.
    fn resize_target(&mut self, id: TargetId, width: u32, height: u32) -> Result<(), BackendError>;

    /// Frees a target. Unknown handles are ignored.
    fn release_target(&mut self, id: TargetId);

    fn target_size(&self, id: TargetId) -> Option<(u32, u32)>;

    /// Makes `target` the destination of subsequent draws and clears.
    fn bind_target(&mut self, target: Option<TargetId>);

    fn bound_target(&self) -> Option<TargetId>;

    /// Clears the bound target.
    fn clear(&mut self, rgba: [f32; 4]);

    fn set_blending(&mut self, enabled: bool);

    /// Draws `source` into the bound target through `quad`.
    fn draw_quad(
        &mut self,
        source: TargetId,
        quad: &BlitQuad,
        state: &BlitState,
    ) -> Result<(), BackendError>;

    /// Uploads an immutable warp mesh.
    fn upload_mesh(&mut self, vertices: &[EyeMeshVertex]) -> Result<MeshId, BackendError>;

    fn release_mesh(&mut self, id: MeshId);

    /// Draws one eye of the warp mesh sampling `source` into the bound target.
    fn draw_warp(
        &mut self,
        source: TargetId,
        mesh: MeshId,
        params: &WarpParams,
    ) -> Result<(), BackendError>;

    /// Reads back `source` as tightly packed RGBA8 rows.
    ///
    /// Synchronous: the call waits for all pending work touching `source`.
    /// Returns the target size.
    fn read_pixels(&mut self, source: TargetId, out: &mut Vec<u8>)
        -> Result<(u32, u32), BackendError>;

    /// Wraps a platform image as a render target.
    fn import_image(&mut self, image: &Self::ExternalImage) -> Result<TargetId, BackendError>;

    /// Number of targets currently allocated (excluding the default target).
    fn live_targets(&self) -> usize;
}
