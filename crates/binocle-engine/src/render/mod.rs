//! wgpu implementation of [`RenderBackend`](crate::backend::RenderBackend).
//!
//! Two pipeline families, each in an opaque and a premultiplied-alpha
//! variant:
//! - composite: one textured quad, pixel-space destination, color matrix
//! - warp: one eye of the lens mesh, optional distortion, fog and dispersion
//!
//! Convention:
//! - destination rects are in pixels of the bound target (top-left origin, +Y down)
//! - the vertex shaders convert to NDC using a `target_size` uniform

mod backend;
mod common;
mod pipelines;

pub use backend::WgpuBackend;
pub use common::TARGET_FORMAT;
