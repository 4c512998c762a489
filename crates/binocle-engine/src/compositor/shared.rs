use crate::backend::RenderBackend;
use crate::coords::{ColorMatrix, Extent};
use crate::error::{CompositorError, Result};
use crate::stack::RenderTargetStack;

use super::{CaptureState, GroupMode};

/// A `begin_group` still waiting for its `end_group`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct OpenGroup {
    pub mode: GroupMode,
    /// Stack depth when the group was opened.
    pub depth: usize,
    pub color_transform: ColorMatrix,
}

/// State shared by both compositors: the target stack, the capture request,
/// the viewport groups are sized to and the open group list.
#[derive(Debug, Default)]
pub(crate) struct CompositorCore {
    pub stack: RenderTargetStack,
    pub capture: CaptureState,
    pub viewport: Extent,
    open: Vec<OpenGroup>,
}

impl CompositorCore {
    /// Opens a nested or capture group, pushing a stack slot.
    pub fn begin_stack_group<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        color_transform: ColorMatrix,
        mode: GroupMode,
    ) -> Result<()> {
        let depth = self.stack.depth();
        let Extent { width, height } = self.viewport;
        if mode == GroupMode::CaptureGroup {
            let pending = self.capture.take_pending();
            self.stack.push_capture(backend, pending, width, height)?;
        } else {
            self.stack.push(backend, color_transform, width, height)?;
        }
        self.open.push(OpenGroup { mode, depth, color_transform });
        Ok(())
    }

    /// Closes the group opened by [`begin_stack_group`](Self::begin_stack_group).
    pub fn end_stack_group<B: RenderBackend>(&mut self, backend: &mut B, mode: GroupMode) -> Result<()> {
        self.close(mode)?;
        self.stack.pop(backend)
    }

    /// Opens a group that owns no stack slot.
    pub fn open(&mut self, mode: GroupMode, color_transform: ColorMatrix) {
        let depth = self.stack.depth();
        self.open.push(OpenGroup { mode, depth, color_transform });
    }

    /// Closes the innermost open group, which must have been opened with `mode`.
    ///
    /// # Errors
    /// - `StackUnderflow` with nothing open.
    /// - `UnbalancedGroups` when a stereo group is closed over groups that are still open.
    /// - `GroupModeMismatch` otherwise when the modes differ.
    pub fn close(&mut self, mode: GroupMode) -> Result<OpenGroup> {
        let top = *self.open.last().ok_or(CompositorError::StackUnderflow)?;
        if top.mode != mode {
            if mode.is_stereo() {
                if let Some(outer) = self.open.iter().rev().find(|g| g.mode == mode) {
                    return Err(CompositorError::UnbalancedGroups {
                        expected: outer.depth,
                        actual: self.stack.depth(),
                    });
                }
            }
            return Err(CompositorError::GroupModeMismatch);
        }
        self.open.pop();
        Ok(top)
    }

    pub fn open_groups(&self) -> usize {
        self.open.len()
    }

    /// Pops every slot and forgets open groups.
    pub fn unwind<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        self.open.clear();
        self.stack.unwind(backend)
    }
}
