/// Size of a render target in physical pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A target can only be allocated with a non-zero size.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Halves both dimensions, never going below one pixel.
    #[inline]
    pub fn halved(self) -> Self {
        Self::new((self.width / 2).max(1), (self.height / 2).max(1))
    }
}
