/// Side of the terminal comparison grid.
pub const GRID: usize = 8;

/// Fingerprint columns: one gradient per horizontal neighbour pair.
const COLS: usize = GRID - 1;

/// Grey-value variance below which a frame is considered uniform.
pub const VARIANCE_THRESHOLD: f32 = 20.0;

/// 8×8 greyscale image, row-major.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GreyImage(pub [u8; GRID * GRID]);

impl GreyImage {
    /// Converts RGBA8 pixels with `luma = 0.2989 R + 0.5870 G + 0.1140 B`.
    ///
    /// Returns `None` if fewer than 64 pixels are supplied.
    pub fn from_rgba(rgba: &[u8]) -> Option<Self> {
        if rgba.len() < GRID * GRID * 4 {
            return None;
        }
        let mut grey = [0u8; GRID * GRID];
        for (g, px) in grey.iter_mut().zip(rgba.chunks_exact(4)) {
            let luma = 0.2989 * f32::from(px[0]) + 0.5870 * f32::from(px[1]) + 0.1140 * f32::from(px[2]);
            *g = luma as u8;
        }
        Some(GreyImage(grey))
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> u8 {
        self.0[row * GRID + col]
    }

    /// Population variance of the grey values.
    pub fn variance(&self) -> f32 {
        let n = self.0.len() as f32;
        let mean = self.0.iter().map(|&v| f32::from(v)).sum::<f32>() / n;
        self.0
            .iter()
            .map(|&v| {
                let d = f32::from(v) - mean;
                d * d
            })
            .sum::<f32>()
            / n
    }

    #[inline]
    pub fn is_uniform(&self) -> bool {
        self.variance() < VARIANCE_THRESHOLD
    }

    /// Bit `(row, col)` is set when pixel `col + 1` is brighter than pixel `col`.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut bits = 0u64;
        for row in 0..GRID {
            for col in 0..COLS {
                if self.at(row, col + 1) > self.at(row, col) {
                    bits |= 1 << (row * COLS + col);
                }
            }
        }
        Fingerprint(bits)
    }
}

/// Horizontal-gradient sign bitmap of a [`GreyImage`] (8 rows × 7 columns).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    #[inline]
    pub fn bit(self, row: usize, col: usize) -> bool {
        self.0 >> (row * COLS + col) & 1 == 1
    }

    /// Weighted count of differing bits.
    ///
    /// An isolated mismatch weighs 1; a mismatch with a mismatching
    /// 4-neighbour weighs 3.
    pub fn mismatch_weight(self, other: Fingerprint) -> u32 {
        let diff = Fingerprint(self.0 ^ other.0);
        let mut total = 0;
        for row in 0..GRID {
            for col in 0..COLS {
                if !diff.bit(row, col) {
                    continue;
                }
                let connected = (col > 0 && diff.bit(row, col - 1))
                    || (col + 1 < COLS && diff.bit(row, col + 1))
                    || (row > 0 && diff.bit(row - 1, col))
                    || (row + 1 < GRID && diff.bit(row + 1, col));
                total += if connected { 3 } else { 1 };
            }
        }
        total
    }

    /// `1 - weight / 64`, clamped to `[0, 1]`.
    pub fn similarity(self, other: Fingerprint) -> f32 {
        let ratio = self.mismatch_weight(other) as f32 / (GRID * GRID) as f32;
        (1.0 - ratio).max(0.0)
    }
}
