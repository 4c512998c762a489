use crate::backend::{MeshId, TargetId};
use crate::compositor::DisplayId;

/// Failures reported by a [`RenderBackend`](crate::backend::RenderBackend).
///
/// Allocation failures are fatal for the operation that triggered them; the
/// compositor never retries.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("render target {width}x{height} is incomplete")]
    IncompleteTarget { width: u32, height: u32 },
    #[error("unknown render target {0:?}")]
    UnknownTarget(TargetId),
    #[error("unknown mesh buffer {0:?}")]
    UnknownMesh(MeshId),
    #[error("pixel readback failed: {0}")]
    Readback(String),
    #[error("external image import failed: {0}")]
    Import(String),
}

/// Failures reported by the compositors.
///
/// Everything except `Backend` is a caller contract violation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CompositorError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("pop on an empty render target stack")]
    StackUnderflow,
    #[error("display {0:?} is out of range")]
    UnknownDisplay(DisplayId),
    #[error("groups unbalanced at warp pass: expected depth {expected}, found {actual}")]
    UnbalancedGroups { expected: usize, actual: usize },
    #[error("end_group mode does not match the open group")]
    GroupModeMismatch,
    #[error("eye targets have not been allocated")]
    MissingEyeTargets,
}

pub type Result<T, E = CompositorError> = std::result::Result<T, E>;
