use super::Vec2;

/// Axis-aligned rectangle (top-left origin).
///
/// Used both for destination rects in pixels and for source rects in
/// normalized texture coordinates.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    /// The whole texture in normalized coordinates.
    pub const UNIT: Rect = Rect::new(0.0, 0.0, 1.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    /// Rect covering a `width`×`height` pixel target.
    #[inline]
    pub fn from_size(width: u32, height: u32) -> Self {
        Rect::new(0.0, 0.0, width as f32, height as f32)
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.origin.x + self.size.x, self.origin.y + self.size.y)
    }

    /// Upper half along Y.
    #[inline]
    pub fn top_half(self) -> Self {
        Rect::new(self.origin.x, self.origin.y, self.size.x, self.size.y * 0.5)
    }

    /// Lower half along Y.
    #[inline]
    pub fn bottom_half(self) -> Self {
        let h = self.size.y * 0.5;
        Rect::new(self.origin.x, self.origin.y + h, self.size.x, h)
    }
}
