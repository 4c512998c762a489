use crate::backend::TargetId;

/// Composite-to-buffer request raised by the frame pipeline.
///
/// The target stays attached until cancelled; the request is consumed by
/// the first capture-aware group that runs.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CaptureState {
    target: Option<TargetId>,
    requested: bool,
}

impl CaptureState {
    pub fn request(&mut self, target: TargetId) {
        self.target = Some(target);
        self.requested = true;
    }

    pub fn cancel(&mut self) {
        self.target = None;
        self.requested = false;
    }

    /// Consumes the request, returning the target to write into.
    pub fn take_pending(&mut self) -> Option<TargetId> {
        if std::mem::take(&mut self.requested) { self.target } else { None }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.requested && self.target.is_some()
    }

    /// Attached target, pending or not.
    #[inline]
    pub fn target(&self) -> Option<TargetId> {
        self.target
    }
}
