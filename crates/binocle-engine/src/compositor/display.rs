use crate::backend::{MeshId, RenderBackend, TargetId};
use crate::coords::Extent;
use crate::warp::Eye;

/// Number of physical displays a compositor drives.
pub const DISPLAY_COUNT: usize = 2;

/// Physical display index.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(pub u32);

impl DisplayId {
    pub const PRIMARY: DisplayId = DisplayId(0);
    pub const EXTERNAL: DisplayId = DisplayId(1);

    /// `None` when `index` is not below [`DISPLAY_COUNT`].
    pub fn from_index(index: usize) -> Option<Self> {
        (index < DISPLAY_COUNT).then_some(DisplayId(index as u32))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_primary(self) -> bool {
        self == DisplayId::PRIMARY
    }

    pub fn all() -> impl Iterator<Item = DisplayId> {
        (0..DISPLAY_COUNT as u32).map(DisplayId)
    }
}

/// Mesh, eye buffers and last known geometry of one display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerDisplayState {
    pub mesh: Option<MeshId>,
    /// Last size passed to `set_target_geometry`.
    pub size: Extent,
    /// Size changed since the mesh was last built.
    pub recompute: bool,
    pub left: Option<TargetId>,
    pub right: Option<TargetId>,
    pub eye_size: Extent,
}

impl PerDisplayState {
    /// Records a new display size; returns whether it changed.
    pub(crate) fn record_geometry(&mut self, size: Extent) -> bool {
        if self.size == size {
            return false;
        }
        self.size = size;
        self.recompute = true;
        true
    }

    pub fn eye_targets(&self) -> Option<(TargetId, TargetId)> {
        self.left.zip(self.right)
    }

    pub fn eye_target(&self, eye: Eye) -> Option<TargetId> {
        match eye {
            Eye::Left => self.left,
            Eye::Right => self.right,
        }
    }

    /// Installs a freshly uploaded mesh and frees the one it replaces.
    pub(crate) fn replace_mesh<B: RenderBackend>(&mut self, backend: &mut B, mesh: MeshId) {
        if let Some(old) = self.mesh.replace(mesh) {
            backend.release_mesh(old);
        }
        self.recompute = false;
    }

    pub(crate) fn release<B: RenderBackend>(&mut self, backend: &mut B) {
        if let Some(mesh) = self.mesh.take() {
            backend.release_mesh(mesh);
        }
        for target in [self.left.take(), self.right.take()].into_iter().flatten() {
            backend.release_target(target);
        }
        self.eye_size = Extent::default();
    }
}
