//! Coordinate and geometry types shared by the compositor and its backends.
//!
//! Canonical CPU space:
//! - Physical pixels of the bound render target
//! - Origin top-left
//! - +X right, +Y down
//!
//! Texture coordinates use the same orientation in the `0..1` range.

mod extent;
mod matrix;
mod rect;
mod vec2;

pub use extent::Extent;
pub use matrix::ColorMatrix;
pub use rect::Rect;
pub use vec2::Vec2;
