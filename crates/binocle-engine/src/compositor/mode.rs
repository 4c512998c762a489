/// How a `begin_group`/`end_group` pair behaves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GroupMode {
    /// Eye content is composed, then warped onto the active target.
    StereoWarpGroup,
    /// Draws go into the pending capture target, or are discarded.
    CaptureGroup,
    /// Offscreen group composited back through its color transform.
    NestedGroup,
    /// Like `StereoWarpGroup`, but a pending capture receives the warp.
    StereoWarpWithCapture,
}

impl GroupMode {
    /// Maps the integer codes used by older frame pipelines.
    pub fn from_legacy(code: i32) -> Option<Self> {
        match code {
            1 => Some(GroupMode::StereoWarpGroup),
            2 => Some(GroupMode::CaptureGroup),
            3 => Some(GroupMode::NestedGroup),
            4 => Some(GroupMode::StereoWarpWithCapture),
            _ => None,
        }
    }

    pub fn legacy(self) -> i32 {
        match self {
            GroupMode::StereoWarpGroup => 1,
            GroupMode::CaptureGroup => 2,
            GroupMode::NestedGroup => 3,
            GroupMode::StereoWarpWithCapture => 4,
        }
    }

    #[inline]
    pub fn is_stereo(self) -> bool {
        matches!(self, GroupMode::StereoWarpGroup | GroupMode::StereoWarpWithCapture)
    }
}
