use crate::backend::{RenderBackend, TargetId};
use crate::config::ConfigStore;
use crate::coords::{ColorMatrix, Extent};
use crate::error::{CompositorError, Result};

use super::shared::CompositorCore;
use super::{Compositor, CompositorKind, DisplayId, GroupMode};

/// Nested groups and captures only. Stereo modes run as nested groups.
#[derive(Debug, Default)]
pub struct PlainCompositor {
    core: CompositorCore,
    warned_stereo: bool,
}

impl PlainCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    fn effective(&mut self, mode: GroupMode) -> GroupMode {
        if !mode.is_stereo() {
            return mode;
        }
        if !self.warned_stereo {
            self.warned_stereo = true;
            log::debug!("{mode:?} requested without stereo support; using nested groups");
        }
        GroupMode::NestedGroup
    }
}

impl<B: RenderBackend> Compositor<B> for PlainCompositor {
    fn kind(&self) -> CompositorKind {
        CompositorKind::Plain
    }

    fn begin_frame(&mut self, _store: &mut dyn ConfigStore) {}

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.core.viewport = Extent::new(width, height);
    }

    fn set_target_geometry(&mut self, display: DisplayId, _width: u32, _height: u32) -> Result<()> {
        if DisplayId::from_index(display.index()).is_none() {
            return Err(CompositorError::UnknownDisplay(display));
        }
        Ok(())
    }

    fn begin_group(&mut self, backend: &mut B, color_transform: ColorMatrix, mode: GroupMode) -> Result<()> {
        let mode = self.effective(mode);
        self.core.begin_stack_group(backend, color_transform, mode)
    }

    fn end_group(&mut self, backend: &mut B, mode: GroupMode) -> Result<()> {
        let mode = self.effective(mode);
        self.core.end_stack_group(backend, mode)
    }

    fn request_capture(&mut self, target: TargetId) {
        self.core.capture.request(target);
    }

    fn cancel_capture(&mut self) {
        self.core.capture.cancel();
    }

    fn capture_pending(&self) -> bool {
        self.core.capture.is_pending()
    }

    fn depth(&self) -> usize {
        self.core.stack.depth()
    }

    fn release(&mut self, backend: &mut B) -> Result<()> {
        self.core.unwind(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Command, RecordingBackend};
    use crate::backend::{Filter, TargetDesc};

    fn setup() -> (RecordingBackend, PlainCompositor) {
        let mut c = PlainCompositor::new();
        Compositor::<RecordingBackend>::set_viewport(&mut c, 16, 16);
        (RecordingBackend::new(16, 16), c)
    }

    // ── nesting ───────────────────────────────────────────────────────────

    #[test]
    fn balanced_groups_restore_binding_and_resources() {
        let (mut b, mut c) = setup();
        for _ in 0..5 {
            c.begin_group(&mut b, ColorMatrix::IDENTITY, GroupMode::NestedGroup).unwrap();
        }
        assert_eq!(Compositor::<RecordingBackend>::depth(&c), 5);
        for _ in 0..5 {
            c.end_group(&mut b, GroupMode::NestedGroup).unwrap();
        }
        assert_eq!(b.bound_target(), None);
        assert_eq!(b.live_targets(), 0);
    }

    #[test]
    fn end_without_begin_underflows() {
        let (mut b, mut c) = setup();
        assert!(matches!(
            c.end_group(&mut b, GroupMode::NestedGroup),
            Err(CompositorError::StackUnderflow)
        ));
    }

    #[test]
    fn stereo_modes_degrade_to_nested() {
        let (mut b, mut c) = setup();
        c.begin_group(&mut b, ColorMatrix::IDENTITY, GroupMode::StereoWarpGroup).unwrap();
        assert_eq!(Compositor::<RecordingBackend>::depth(&c), 1);
        c.end_group(&mut b, GroupMode::StereoWarpGroup).unwrap();
        assert!(b.commands().iter().any(|cmd| matches!(cmd, Command::Quad { target: None, .. })));
        assert!(!b.commands().iter().any(|cmd| matches!(cmd, Command::Warp { .. })));
    }

    // ── capture ───────────────────────────────────────────────────────────

    #[test]
    fn capture_group_writes_into_requested_target() {
        let (mut b, mut c) = setup();
        let capture = b.create_target(&TargetDesc::new("capture", 16, 16, Filter::Nearest)).unwrap();
        Compositor::<RecordingBackend>::request_capture(&mut c, capture);

        c.begin_group(&mut b, ColorMatrix::IDENTITY, GroupMode::CaptureGroup).unwrap();
        assert_eq!(b.bound_target(), Some(capture));
        c.end_group(&mut b, GroupMode::CaptureGroup).unwrap();

        assert_eq!(b.bound_target(), None);
        assert_eq!(b.live_targets(), 1);
        assert!(!Compositor::<RecordingBackend>::capture_pending(&c));
    }

    #[test]
    fn capture_group_without_request_is_discarded() {
        let (mut b, mut c) = setup();
        c.begin_group(&mut b, ColorMatrix::IDENTITY, GroupMode::CaptureGroup).unwrap();
        c.end_group(&mut b, GroupMode::CaptureGroup).unwrap();
        assert_eq!(b.live_targets(), 0);
        assert!(!b.commands().iter().any(|cmd| matches!(cmd, Command::Quad { .. })));
    }

    #[test]
    fn out_of_range_display_is_rejected() {
        let (_, mut c) = setup();
        assert!(matches!(
            Compositor::<RecordingBackend>::set_target_geometry(&mut c, DisplayId(2), 8, 8),
            Err(CompositorError::UnknownDisplay(DisplayId(2)))
        ));
    }
}
