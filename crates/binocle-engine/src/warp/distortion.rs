use crate::config::StereoConfig;
use crate::coords::{Extent, Vec2};

/// Applies barrel/pincushion distortion to a texture coordinate.
///
/// The coordinate is centered on `(0.5, 0.5)` and its X component scaled by
/// `aspect` so the lens model is radially symmetric in eye-buffer pixels:
/// `c' = c * (1 + k1·r² + k2·r⁴)`.
///
/// With `k1 = k2 = 0` this is the identity (up to float rounding).
#[inline]
pub fn distort(tex: Vec2, k1: f32, k2: f32, aspect: f32) -> Vec2 {
    let mut c = tex - Vec2::splat(0.5);
    c.x *= aspect;

    let r2 = c.x * c.x + c.y * c.y;
    let r4 = r2 * r2;
    c = c * (1.0 + k1 * r2 + k2 * r4);

    c.x /= aspect;
    c + Vec2::splat(0.5)
}

/// Horizontal scale applied to texture coordinates before the radial model.
///
/// Always measured against the wide layout (display width times height
/// scale over half the display height, shrunk by the IPD scale), whichever
/// orientation the mesh uses. Degenerate geometry yields `1.0`.
pub fn aspect_ratio(display: Extent, config: &StereoConfig) -> f32 {
    let w = display.width as f32;
    let h = display.height as f32;
    let shrink = 1.0 - 0.5 * config.effective_ipd_scale().abs();

    let eye_w = w * config.height_scale;
    let eye_h = (h * 0.5) * shrink;

    if eye_w > 0.0 && eye_h > 0.0 && (eye_w / eye_h).is_finite() {
        eye_w / eye_h
    } else {
        1.0
    }
}
