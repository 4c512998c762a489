use bytemuck::{Pod, Zeroable};

use crate::backend::{MeshId, RenderBackend};
use crate::compositor::DisplayId;
use crate::config::{Distortion, Orientation, StereoConfig};
use crate::coords::{Extent, Vec2};
use crate::error::BackendError;

use super::distortion::{aspect_ratio, distort};

/// Grid cells per axis.
pub const GRID_RESOLUTION: usize = 64;

/// Two triangles per grid cell, no index buffer.
pub const VERTICES_PER_CELL: usize = 6;

/// One warp mesh vertex. Layout is shared with the warp shader (stride 48).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct EyeMeshVertex {
    /// Left-eye position in display pixels.
    pub left: [f32; 2],
    /// Right-eye position in display pixels.
    pub right: [f32; 2],
    pub uv_red: [f32; 2],
    pub uv_green: [f32; 2],
    pub uv_blue: [f32; 2],
    /// Pass-through coordinate for displays without a lens.
    pub uv_undistorted: [f32; 2],
}

/// Layout parameters resolved from a display size and a config snapshot.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MeshGeometry {
    pub display: Extent,
    pub orientation: Orientation,
    /// Size of one eye's viewport in pixels.
    pub eye_size: Vec2,
    /// Offset that centers the eye along the non-split axis.
    pub centering: f32,
    /// Largest IPD offset in pixels (`offset = 1.0`).
    pub ipd_max: f32,
    pub ipd_offset: f32,
    /// Scale actually applied; zero whenever `ipd_offset` is non-zero.
    pub ipd_scale: f32,
    pub aspect: f32,
}

impl MeshGeometry {
    pub fn resolve(display: Extent, config: &StereoConfig) -> Self {
        let w = display.width as f32;
        let h = display.height as f32;
        let hs = config.height_scale;

        let (eye_size, centering, ipd_max) = match config.orientation {
            Orientation::Wide => (Vec2::new(w * hs, h * 0.5), w * (1.0 - hs) * 0.5, (h / 2.0) / 10.0),
            Orientation::Tall => (Vec2::new(w * 0.5, h * hs), h * (1.0 - hs) * 0.5, (w / 2.0) / 10.0),
        };

        Self {
            display,
            orientation: config.orientation,
            eye_size,
            centering,
            ipd_max,
            ipd_offset: config.ipd_offset,
            ipd_scale: config.effective_ipd_scale(),
            aspect: aspect_ratio(display, config),
        }
    }

    /// Left/right positions for the grid point `(x, y)` in `[0, 1]²`.
    pub fn positions(&self, x: f32, y: f32) -> (Vec2, Vec2) {
        let e = self.eye_size;
        match self.orientation {
            Orientation::Wide => {
                let px = e.x * x + self.centering;
                let (ly, ry) = self.split_axis(e.y * y, e.y * y + e.y, e.y, self.display.height as f32);
                (Vec2::new(px, ly), Vec2::new(px, ry))
            }
            Orientation::Tall => {
                let py = e.y * y + self.centering;
                let (lx, rx) = self.split_axis(e.x * x, e.x * x + e.x, e.x, self.display.width as f32);
                (Vec2::new(lx, py), Vec2::new(rx, py))
            }
        }
    }

    /// Applies IPD offset/scale along the axis that separates the eyes.
    ///
    /// `half` is the boundary between the eyes, `span` the full display extent
    /// on that axis.
    fn split_axis(&self, mut left: f32, mut right: f32, half: f32, span: f32) -> (f32, f32) {
        left = (left + self.ipd_max * self.ipd_offset).min(half);
        right = (right - self.ipd_max * self.ipd_offset).max(half);

        let s = self.ipd_scale;
        if s > 0.0 {
            let shrink = 1.0 - 0.5 * s;
            left *= shrink;
            right = right * shrink + (span / 4.0) * s * 2.0;
        } else if s < 0.0 {
            let s = -s;
            let shrink = 1.0 - 0.5 * s;
            left = left * shrink + (span / 4.0) * s;
            right = right * shrink + (span / 4.0) * s;
        }
        (left, right)
    }
}

/// Builds warp meshes. Keeps its grid scratch buffer between rebuilds.
#[derive(Debug, Default)]
pub struct WarpMeshGenerator {
    grid: Vec<EyeMeshVertex>,
}

impl WarpMeshGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices in a triangulated mesh.
    pub const fn draw_vertex_count() -> usize {
        GRID_RESOLUTION * GRID_RESOLUTION * VERTICES_PER_CELL
    }

    /// Computes the triangulated mesh on the CPU.
    ///
    /// Pure with respect to its inputs: the same display and config always
    /// produce bit-identical vertices.
    pub fn build(&mut self, display: Extent, config: &StereoConfig) -> Vec<EyeMeshVertex> {
        let geo = MeshGeometry::resolve(display, config);
        let n = GRID_RESOLUTION;

        self.grid.clear();
        self.grid.reserve((n + 1) * (n + 1));
        for yi in 0..=n {
            for xi in 0..=n {
                let x = xi as f32 / n as f32;
                let y = yi as f32 / n as f32;
                self.grid.push(grid_vertex(&geo, config, x, y));
            }
        }

        let at = |xi: usize, yi: usize| self.grid[yi * (n + 1) + xi];
        let mut faces = Vec::with_capacity(Self::draw_vertex_count());
        for yi in 0..n {
            for xi in 0..n {
                let v0 = at(xi, yi);
                let v1 = at(xi + 1, yi);
                let v2 = at(xi + 1, yi + 1);
                let v3 = at(xi, yi + 1);
                faces.extend_from_slice(&[v0, v1, v2, v2, v3, v0]);
            }
        }
        faces
    }

    /// Builds and uploads a mesh for `display_id`, returning the new buffer.
    ///
    /// The caller owns the returned handle and releases the one it replaces.
    pub fn regenerate<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        display_id: DisplayId,
        display: Extent,
        config: &StereoConfig,
    ) -> Result<MeshId, BackendError> {
        let vertices = self.build(display, config);
        let mesh = backend.upload_mesh(&vertices)?;
        log::info!(
            "warp mesh for {display_id:?} rebuilt: {}x{} {:?}, {} vertices",
            display.width,
            display.height,
            config.orientation,
            vertices.len()
        );
        Ok(mesh)
    }
}

fn grid_vertex(geo: &MeshGeometry, config: &StereoConfig, x: f32, y: f32) -> EyeMeshVertex {
    let (left, right) = geo.positions(x, y);
    let tex = Vec2::new(x, y);
    let uv = |d: Distortion| distort(tex, d.k1, d.k2, geo.aspect).to_array();

    EyeMeshVertex {
        left: left.to_array(),
        right: right.to_array(),
        uv_red: uv(config.red),
        uv_green: uv(config.green),
        uv_blue: uv(config.blue),
        uv_undistorted: uv(Distortion::NONE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hd() -> Extent {
        Extent::new(1920, 1080)
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn wide_mesh_has_expected_size_and_origin() {
        let cfg = StereoConfig::default();
        let mesh = WarpMeshGenerator::new().build(hd(), &cfg);

        assert_eq!(mesh.len(), 64 * 64 * 6);
        assert_eq!(mesh.len(), 24_576);
        // Grid vertex (0, 0) opens the first cell.
        assert_eq!(mesh[0].left, [1920.0 * (1.0 - 0.5) * 0.5, 0.0]);
        assert_eq!(mesh[0].right, [480.0, 540.0]);
    }

    #[test]
    fn cells_are_two_triangles_sharing_a_diagonal() {
        let mesh = WarpMeshGenerator::new().build(hd(), &StereoConfig::default());
        let cell = &mesh[..6];
        assert_eq!(cell[2], cell[3]);
        assert_eq!(cell[0], cell[5]);
    }

    #[test]
    fn tall_layout_places_eyes_side_by_side() {
        let cfg = StereoConfig { orientation: Orientation::Tall, ..StereoConfig::default() };
        let geo = MeshGeometry::resolve(hd(), &cfg);
        let (l, r) = geo.positions(0.0, 0.0);
        assert_eq!(l, Vec2::new(0.0, 270.0));
        assert_eq!(r, Vec2::new(960.0, 270.0));
    }

    #[test]
    fn undistorted_coordinates_follow_the_grid() {
        let cfg = StereoConfig {
            red: Distortion::new(0.3, 0.1),
            ..StereoConfig::default()
        };
        let mesh = WarpMeshGenerator::new().build(hd(), &cfg);
        let last = mesh[mesh.len() - 4];
        // Third vertex of the last cell is grid point (64, 64).
        assert!((last.uv_undistorted[0] - 1.0).abs() < 1e-6);
        assert!((last.uv_undistorted[1] - 1.0).abs() < 1e-6);
        assert_ne!(last.uv_red, last.uv_undistorted);
    }

    // ── determinism ───────────────────────────────────────────────────────

    #[test]
    fn rebuild_is_bit_identical() {
        let cfg = StereoConfig {
            red: Distortion::new(0.22, 0.24),
            green: Distortion::new(0.2, 0.22),
            blue: Distortion::new(0.18, 0.2),
            ipd_scale: -0.3,
            ..StereoConfig::default()
        };
        let mut generator = WarpMeshGenerator::new();
        let a = generator.build(hd(), &cfg);
        let b = generator.build(hd(), &cfg);
        let a_bytes: &[u8] = bytemuck::cast_slice(&a);
        let b_bytes: &[u8] = bytemuck::cast_slice(&b);
        assert_eq!(a_bytes, b_bytes);
    }

    // ── IPD ───────────────────────────────────────────────────────────────

    #[test]
    fn offset_forces_scale_to_zero() {
        for &scale in &[-0.5, 0.25, 1.0] {
            let cfg = StereoConfig { ipd_offset: 0.4, ipd_scale: scale, ..StereoConfig::default() };
            assert_eq!(MeshGeometry::resolve(hd(), &cfg).ipd_scale, 0.0);

            let offset_only = StereoConfig { ipd_scale: 0.0, ..cfg.clone() };
            let mut generator = WarpMeshGenerator::new();
            assert_eq!(generator.build(hd(), &cfg), generator.build(hd(), &offset_only));
        }
    }

    #[test]
    fn offset_is_clamped_at_the_eye_boundary() {
        let cfg = StereoConfig { ipd_offset: 1.0, ..StereoConfig::default() };
        let geo = MeshGeometry::resolve(hd(), &cfg);
        for i in 0..=8 {
            let (l, r) = geo.positions(0.5, i as f32 / 8.0);
            assert!(l.y <= 540.0);
            assert!(r.y >= 540.0);
        }
        // ipd_max = (1080 / 2) / 10
        assert_eq!(geo.positions(0.0, 0.0).0.y, 54.0);
    }

    #[test]
    fn positive_scale_shrinks_left_and_shifts_right() {
        let cfg = StereoConfig { ipd_scale: 0.5, ..StereoConfig::default() };
        let geo = MeshGeometry::resolve(hd(), &cfg);
        let (l, r) = geo.positions(0.0, 1.0);
        assert_eq!(l.y, 540.0 * 0.75);
        assert_eq!(r.y, 1080.0 * 0.75 + 270.0);
    }

    #[test]
    fn negative_scale_shrinks_both_eyes_and_shifts_them_down() {
        let cfg = StereoConfig { ipd_scale: -0.5, ..StereoConfig::default() };
        let geo = MeshGeometry::resolve(hd(), &cfg);
        // shrink = 0.75, shift = (1080 / 4) * 0.5
        let (l, r) = geo.positions(0.0, 0.0);
        assert_eq!(l, Vec2::new(480.0, 135.0));
        assert_eq!(r, Vec2::new(480.0, 540.0 * 0.75 + 135.0));
        let (l, r) = geo.positions(0.0, 1.0);
        assert_eq!(l.y, 540.0 * 0.75 + 135.0);
        assert_eq!(r.y, 1080.0 * 0.75 + 135.0);
    }

    #[test]
    fn tall_offset_is_clamped_at_the_eye_boundary() {
        let cfg = StereoConfig {
            orientation: Orientation::Tall,
            ipd_offset: 1.0,
            ..StereoConfig::default()
        };
        let geo = MeshGeometry::resolve(hd(), &cfg);
        // ipd_max = (1920 / 2) / 10
        let (l, r) = geo.positions(0.0, 0.0);
        assert_eq!(l, Vec2::new(96.0, 270.0));
        assert_eq!(r, Vec2::new(960.0, 270.0));
        let (l, r) = geo.positions(1.0, 0.0);
        assert_eq!(l.x, 960.0);
        assert_eq!(r.x, 1920.0 - 96.0);
    }
}
