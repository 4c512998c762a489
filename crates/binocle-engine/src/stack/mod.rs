//! LIFO stack of offscreen composition groups.
//!
//! Each push allocates a target sized for the group and binds it. Each pop
//! rebinds the target underneath (or the default target) and composites the
//! popped group onto it through the group's color transform, then frees the
//! group. A capture slot variant writes into an externally owned target.

mod group;

pub use group::CompositionGroup;

use crate::backend::{BlitQuad, BlitState, Filter, RenderBackend, TargetDesc, TargetId};
use crate::coords::ColorMatrix;
use crate::error::{CompositorError, Result};

#[derive(Debug)]
enum Slot {
    /// Composited onto the target below on pop.
    Group(CompositionGroup),
    /// Capture push with nothing pending: discarded on pop.
    Scratch(CompositionGroup),
    /// Capture push into a target owned elsewhere: left untouched on pop.
    Capture(TargetId),
}

impl Slot {
    fn target(&self) -> TargetId {
        match self {
            Slot::Group(g) | Slot::Scratch(g) => g.target,
            Slot::Capture(t) => *t,
        }
    }
}

/// Nested offscreen composition.
#[derive(Debug, Default)]
pub struct RenderTargetStack {
    slots: Vec<Slot>,
}

impl RenderTargetStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Target draws currently land in; `None` is the default target.
    pub fn active_target(&self) -> Option<TargetId> {
        self.slots.last().map(Slot::target)
    }

    /// Allocates a `width`×`height` group, binds it and pushes it.
    ///
    /// # Errors
    /// Allocation failure is returned as is; the stack and the binding are
    /// left unchanged.
    pub fn push<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        color_transform: ColorMatrix,
        width: u32,
        height: u32,
    ) -> Result<TargetId> {
        let group = allocate(backend, color_transform, width, height)?;
        let target = group.target;
        backend.bind_target(Some(target));
        self.slots.push(Slot::Group(group));
        log::debug!("group push {target:?} {width}x{height}, depth {}", self.depth());
        Ok(target)
    }

    /// Capture variant of [`push`](Self::push).
    ///
    /// With a pending `capture` target, draws go straight into it. Without
    /// one, a scratch group receives them and is thrown away on pop.
    pub fn push_capture<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        capture: Option<TargetId>,
        width: u32,
        height: u32,
    ) -> Result<TargetId> {
        let slot = match capture {
            Some(target) => Slot::Capture(target),
            None => Slot::Scratch(allocate(backend, ColorMatrix::IDENTITY, width, height)?),
        };
        let target = slot.target();
        backend.bind_target(Some(target));
        self.slots.push(slot);
        log::debug!("capture push {target:?} (pending: {}), depth {}", capture.is_some(), self.depth());
        Ok(target)
    }

    /// Pops the top slot and restores the target below it.
    ///
    /// Group slots are composited with blending disabled before their
    /// resources are freed; the free happens even if the draw fails.
    ///
    /// # Errors
    /// `StackUnderflow` on an empty stack.
    pub fn pop<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        let slot = self.slots.pop().ok_or(CompositorError::StackUnderflow)?;
        backend.bind_target(self.active_target());

        match slot {
            Slot::Group(group) => {
                backend.set_blending(false);
                let drawn = backend.draw_quad(
                    group.target,
                    &BlitQuad::full(group.width, group.height),
                    &BlitState { color_transform: group.color_transform },
                );
                backend.release_target(group.target);
                drawn?;
                log::debug!("group pop {:?}, depth {}", group.target, self.depth());
            }
            Slot::Scratch(group) => {
                backend.release_target(group.target);
                log::debug!("capture pop discarded {:?}", group.target);
            }
            Slot::Capture(target) => {
                log::debug!("capture pop kept {target:?}");
            }
        }
        Ok(())
    }

    /// Pops every remaining slot, compositing as `pop` does.
    pub fn unwind<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        while !self.is_empty() {
            self.pop(backend)?;
        }
        Ok(())
    }
}

fn allocate<B: RenderBackend>(
    backend: &mut B,
    color_transform: ColorMatrix,
    width: u32,
    height: u32,
) -> Result<CompositionGroup> {
    let target = backend.create_target(&TargetDesc::new("composition group", width, height, Filter::Nearest))?;
    Ok(CompositionGroup { target, width, height, color_transform })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Command, RecordingBackend};

    fn backend() -> RecordingBackend {
        RecordingBackend::new(64, 64)
    }

    // ── balance ───────────────────────────────────────────────────────────

    #[test]
    fn balanced_sequence_restores_binding_and_resources() {
        let mut b = backend();
        let mut stack = RenderTargetStack::new();
        let before_target = b.bound_target();
        let before_live = b.live_targets();

        let sizes = [(64, 64), (32, 48), (16, 8), (7, 9), (1, 1)];
        for &(w, h) in &sizes {
            stack.push(&mut b, ColorMatrix::IDENTITY, w, h).unwrap();
        }
        assert_eq!(stack.depth(), 5);
        assert_eq!(b.live_targets(), before_live + 5);

        for _ in &sizes {
            stack.pop(&mut b).unwrap();
        }
        assert_eq!(stack.depth(), 0);
        assert_eq!(b.bound_target(), before_target);
        assert_eq!(b.live_targets(), before_live);
    }

    #[test]
    fn nested_pop_rebinds_parent_group() {
        let mut b = backend();
        let mut stack = RenderTargetStack::new();
        let outer = stack.push(&mut b, ColorMatrix::IDENTITY, 32, 32).unwrap();
        stack.push(&mut b, ColorMatrix::IDENTITY, 16, 16).unwrap();
        stack.push(&mut b, ColorMatrix::IDENTITY, 8, 8).unwrap();
        stack.pop(&mut b).unwrap();
        stack.pop(&mut b).unwrap();
        assert_eq!(b.bound_target(), Some(outer));
        assert_eq!(stack.active_target(), Some(outer));
    }

    #[test]
    fn pop_on_empty_stack_is_rejected() {
        let mut b = backend();
        let mut stack = RenderTargetStack::new();
        assert!(matches!(stack.pop(&mut b), Err(CompositorError::StackUnderflow)));
    }

    // ── compositing ───────────────────────────────────────────────────────

    #[test]
    fn pop_composites_without_blending_through_the_transform() {
        let mut b = backend();
        let mut stack = RenderTargetStack::new();
        let tint = ColorMatrix::diagonal(1.0, 0.0, 0.0, 1.0);
        let group = stack.push(&mut b, tint, 64, 64).unwrap();
        b.set_blending(true);
        b.clear([1.0, 1.0, 1.0, 1.0]);
        stack.pop(&mut b).unwrap();

        let draws: Vec<_> = b
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Quad { source, target, blending, color_transform } => {
                    Some((*source, *target, *blending, *color_transform))
                }
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![(group, None, false, tint)]);
        assert_eq!(&b.pixels(None).unwrap()[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn failed_allocation_leaves_stack_untouched() {
        let mut b = backend();
        let mut stack = RenderTargetStack::new();
        let outer = stack.push(&mut b, ColorMatrix::IDENTITY, 8, 8).unwrap();
        b.fail_next_allocation();
        assert!(stack.push(&mut b, ColorMatrix::IDENTITY, 8, 8).is_err());
        assert_eq!(stack.depth(), 1);
        assert_eq!(b.bound_target(), Some(outer));
    }

    // ── capture ───────────────────────────────────────────────────────────

    #[test]
    fn capture_slot_writes_into_pending_target_and_keeps_it() {
        let mut b = backend();
        let mut stack = RenderTargetStack::new();
        let capture = b.import_image(&crate::coords::Extent::new(64, 64)).unwrap();
        let live = b.live_targets();

        assert_eq!(stack.push_capture(&mut b, Some(capture), 64, 64).unwrap(), capture);
        assert_eq!(b.bound_target(), Some(capture));
        stack.pop(&mut b).unwrap();

        assert_eq!(b.bound_target(), None);
        assert_eq!(b.live_targets(), live);
        assert!(!b.commands().iter().any(|c| matches!(c, Command::Quad { .. })));
    }

    #[test]
    fn capture_slot_without_request_discards_scratch() {
        let mut b = backend();
        let mut stack = RenderTargetStack::new();
        let scratch = stack.push_capture(&mut b, None, 64, 64).unwrap();
        stack.pop(&mut b).unwrap();

        assert_eq!(b.target_size(scratch), None);
        assert_eq!(b.live_targets(), 0);
        assert!(!b.commands().iter().any(|c| matches!(c, Command::Quad { .. })));
    }
}
