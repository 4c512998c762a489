//! Binocle engine crate.
//!
//! Stereoscopic compositing core: a render-target stack for nested offscreen
//! groups, a lens warp mesh, a stereo compositor that routes eye content
//! through it, and a detector that decides whether content is side-by-side 3D.
//!
//! Rendering goes through the [`backend::RenderBackend`] trait. The crate
//! ships a wgpu implementation ([`render::WgpuBackend`]) and a CPU
//! [`backend::recording::RecordingBackend`] for tests.

pub mod backend;
pub mod compositor;
pub mod config;
pub mod coords;
pub mod detect;
pub mod device;
pub mod error;
pub mod logging;
pub mod render;
pub mod stack;
pub mod warp;

pub use compositor::{create_compositor, Compositor, CompositorKind, DisplayId, GroupMode};
pub use error::{BackendError, CompositorError, Result};
