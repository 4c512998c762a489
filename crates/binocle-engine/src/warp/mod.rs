//! Procedural stereo warp mesh.
//!
//! The mesh is a regular grid over each eye's viewport. Every vertex carries
//! both eye positions and four sets of texture coordinates (red, green, blue
//! distorted; one undistorted), so a single buffer serves both eye passes and
//! both lens modes.

mod distortion;
mod mesh;

pub use distortion::{aspect_ratio, distort};
pub use mesh::{EyeMeshVertex, MeshGeometry, WarpMeshGenerator, GRID_RESOLUTION, VERTICES_PER_CELL};

/// Which eye a pass renders.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}
