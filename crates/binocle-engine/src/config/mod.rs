//! Runtime configuration.
//!
//! Parameters live in a string-keyed [`ConfigStore`] (the persisted property
//! space of the host). The compositor never reads the store per operation;
//! it takes a typed [`StereoConfig`] snapshot once per frame.

pub mod keys;
mod snapshot;
mod store;

pub use snapshot::{Distortion, Orientation, StereoConfig};
pub use store::{ConfigStore, MemoryConfigStore};
