use crate::backend::TargetId;
use crate::coords::ColorMatrix;

/// An offscreen group owned by one stack slot.
///
/// Created on push, freed exactly once on pop.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionGroup {
    /// Color target and its framebuffer.
    pub target: TargetId,
    pub width: u32,
    pub height: u32,
    pub color_transform: ColorMatrix,
}
