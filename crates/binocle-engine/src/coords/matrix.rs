/// 4×4 color transform applied to RGBA samples when a group is composited.
///
/// Row-major: `out[r] = sum(m[r][c] * in[c])`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColorMatrix(pub [[f32; 4]; 4]);

impl ColorMatrix {
    pub const IDENTITY: ColorMatrix = ColorMatrix([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Scales each channel independently.
    pub const fn diagonal(r: f32, g: f32, b: f32, a: f32) -> Self {
        ColorMatrix([
            [r, 0.0, 0.0, 0.0],
            [0.0, g, 0.0, 0.0],
            [0.0, 0.0, b, 0.0],
            [0.0, 0.0, 0.0, a],
        ])
    }

    /// Applies the matrix to a normalized RGBA color.
    pub fn apply(&self, rgba: [f32; 4]) -> [f32; 4] {
        let m = &self.0;
        let mut out = [0.0f32; 4];
        for (r, row) in m.iter().enumerate() {
            out[r] = row[0] * rgba[0] + row[1] * rgba[1] + row[2] * rgba[2] + row[3] * rgba[3];
        }
        out
    }

    /// Column-major layout expected by WGSL `mat4x4<f32>` uniforms.
    pub fn to_cols(&self) -> [[f32; 4]; 4] {
        let m = &self.0;
        let mut cols = [[0.0f32; 4]; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            for (r, v) in col.iter_mut().enumerate() {
                *v = m[r][c];
            }
        }
        cols
    }
}

impl Default for ColorMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}
