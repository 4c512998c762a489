//! Frame compositors.
//!
//! A compositor sequences group pushes and pops on a [`RenderBackend`]. The
//! frame pipeline picks one implementation at startup:
//! - [`PlainCompositor`] only nests offscreen groups and captures
//! - [`StereoCompositor`] additionally routes eye content into per-display
//!   buffers, warps them through the lens mesh and runs content detection
//!
//! Call order per frame: `begin_frame`, `set_viewport`,
//! `set_target_geometry`, then balanced `begin_group`/`end_group` pairs.

mod capture;
mod display;
mod mode;
mod plain;
mod shared;
mod stereo;

pub use capture::CaptureState;
pub use display::{DisplayId, PerDisplayState, DISPLAY_COUNT};
pub use mode::GroupMode;
pub use plain::PlainCompositor;
pub use stereo::StereoCompositor;

use crate::backend::{RenderBackend, TargetId};
use crate::config::ConfigStore;
use crate::coords::ColorMatrix;
use crate::detect::{SampleMode, SampleOutcome};
use crate::error::{BackendError, Result};
use crate::warp::Eye;

/// Draw callback for [`Compositor::render_eye`]; receives the bound eye target.
pub type EyeDraw<'a, B> = dyn FnMut(&mut B, TargetId) -> std::result::Result<(), BackendError> + 'a;

/// Compositor strategy selected once per graphics context.
pub trait Compositor<B: RenderBackend> {
    fn kind(&self) -> CompositorKind;

    /// Takes the per-frame configuration snapshot.
    fn begin_frame(&mut self, store: &mut dyn ConfigStore);

    /// Size of the groups opened from now on.
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Records the size of `display` and makes it the active display.
    ///
    /// # Errors
    /// `UnknownDisplay` for an out-of-range id.
    fn set_target_geometry(&mut self, display: DisplayId, width: u32, height: u32) -> Result<()>;

    fn begin_group(&mut self, backend: &mut B, color_transform: ColorMatrix, mode: GroupMode) -> Result<()>;

    /// Closes the innermost group; `mode` must match its `begin_group`.
    fn end_group(&mut self, backend: &mut B, mode: GroupMode) -> Result<()>;

    /// Redirects the next capture-aware group into `target`.
    fn request_capture(&mut self, target: TargetId);

    fn cancel_capture(&mut self);

    fn capture_pending(&self) -> bool;

    /// Current render target stack depth.
    fn depth(&self) -> usize;

    /// Eye buffer of the active display.
    fn eye_target(&self, _eye: Eye) -> Option<TargetId> {
        None
    }

    /// Runs `draw` with the active display's `eye` buffer bound, then
    /// restores the previous binding. Returns `false` when the compositor
    /// has no eye buffers.
    fn render_eye(&mut self, _backend: &mut B, _eye: Eye, _draw: &mut EyeDraw<'_, B>) -> Result<bool> {
        Ok(false)
    }

    /// One step of stereo content detection.
    fn sample_content(
        &mut self,
        _backend: &mut B,
        _store: &mut dyn ConfigStore,
        _mode: SampleMode,
    ) -> Result<SampleOutcome> {
        Ok(SampleOutcome::Skipped)
    }

    /// Wraps an external image as the capture target and raises a request.
    fn import_capture_target(&mut self, backend: &mut B, image: &B::ExternalImage) -> Result<TargetId> {
        let target = backend.import_image(image)?;
        self.request_capture(target);
        log::debug!("capture target {target:?} imported");
        Ok(target)
    }

    /// Detaches and frees a target created by
    /// [`import_capture_target`](Self::import_capture_target).
    fn release_capture_target(&mut self, backend: &mut B, target: TargetId) {
        self.cancel_capture();
        backend.release_target(target);
    }

    /// Frees every resource the compositor owns.
    fn release(&mut self, backend: &mut B) -> Result<()>;
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum CompositorKind {
    #[default]
    Plain,
    Stereo,
}

pub fn create_compositor<B: RenderBackend + 'static>(kind: CompositorKind) -> Box<dyn Compositor<B>> {
    log::info!("compositor: {kind:?}");
    match kind {
        CompositorKind::Plain => Box::new(PlainCompositor::new()),
        CompositorKind::Stereo => Box::new(StereoCompositor::new()),
    }
}
