use crate::backend::{BlitQuad, BlitState, Filter, RenderBackend, TargetDesc, TargetId};
use crate::coords::{Extent, Rect};
use crate::error::BackendError;

use super::SampleSource;

/// Halving levels plus the terminal level.
pub const PYRAMID_LEVELS: usize = 6;

/// Side of the terminal level.
pub const TERMINAL_SIZE: u32 = 8;

/// One downsampling step for both eyes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PyramidLevel {
    pub size: Extent,
    pub left: TargetId,
    pub right: TargetId,
}

/// Cascade of linearly filtered targets ending in an 8×8 pair.
#[derive(Debug)]
pub struct SimilarityPyramid {
    levels: Vec<PyramidLevel>,
}

/// Level sizes for a primary display: a quarter of its width by half its
/// height, halved per level, then the terminal size.
pub(crate) fn level_sizes(primary: Extent) -> [Extent; PYRAMID_LEVELS] {
    let mut sizes = [Extent::new(TERMINAL_SIZE, TERMINAL_SIZE); PYRAMID_LEVELS];
    let mut size = Extent::new((primary.width / 4).max(1), (primary.height / 2).max(1));
    for s in sizes.iter_mut().take(PYRAMID_LEVELS - 1) {
        *s = size;
        size = size.halved();
    }
    sizes
}

impl SimilarityPyramid {
    /// Allocates every level. On failure, the levels created so far are freed.
    pub fn allocate<B: RenderBackend>(backend: &mut B, primary: Extent) -> Result<Self, BackendError> {
        let mut pyramid = SimilarityPyramid { levels: Vec::with_capacity(PYRAMID_LEVELS) };
        for size in level_sizes(primary) {
            let desc = TargetDesc::new("similarity level", size.width, size.height, Filter::Linear);
            let left = match backend.create_target(&desc) {
                Ok(t) => t,
                Err(e) => {
                    pyramid.release(backend);
                    return Err(e);
                }
            };
            let right = match backend.create_target(&desc) {
                Ok(t) => t,
                Err(e) => {
                    backend.release_target(left);
                    pyramid.release(backend);
                    return Err(e);
                }
            };
            pyramid.levels.push(PyramidLevel { size, left, right });
        }
        log::debug!("similarity pyramid allocated from {}x{}", primary.width, primary.height);
        Ok(pyramid)
    }

    /// Resizes the halving levels in place for a new primary display size.
    pub fn resize<B: RenderBackend>(&mut self, backend: &mut B, primary: Extent) -> Result<(), BackendError> {
        for (level, size) in self.levels.iter_mut().zip(level_sizes(primary)) {
            if level.size == size {
                continue;
            }
            backend.resize_target(level.left, size.width, size.height)?;
            backend.resize_target(level.right, size.width, size.height)?;
            level.size = size;
        }
        Ok(())
    }

    pub fn release<B: RenderBackend>(&mut self, backend: &mut B) {
        for level in self.levels.drain(..) {
            backend.release_target(level.left);
            backend.release_target(level.right);
        }
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn terminal(&self) -> Option<&PyramidLevel> {
        self.levels.last()
    }

    /// Blits both sources down the cascade, one full quad per level.
    ///
    /// The previously bound target is restored afterwards.
    pub fn downsample<B: RenderBackend>(
        &self,
        backend: &mut B,
        left: SampleSource,
        right: SampleSource,
    ) -> Result<(), BackendError> {
        let restore = backend.bound_target();
        backend.set_blending(false);

        let result = self
            .cascade(backend, left, |l| l.left)
            .and_then(|()| self.cascade(backend, right, |l| l.right));

        backend.bind_target(restore);
        result
    }

    fn cascade<B: RenderBackend>(
        &self,
        backend: &mut B,
        from: SampleSource,
        side: impl Fn(&PyramidLevel) -> TargetId,
    ) -> Result<(), BackendError> {
        let (mut source, mut uv) = (from.target, from.uv);
        for level in &self.levels {
            let dst = side(level);
            backend.bind_target(Some(dst));
            let quad = BlitQuad::full(level.size.width, level.size.height).with_src_uv(uv);
            backend.draw_quad(source, &quad, &BlitState::default())?;
            source = dst;
            uv = Rect::UNIT;
        }
        Ok(())
    }
}
