//! Headless GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a window
//! - exposing the device and queue to the render backend

mod gpu;
mod init;

pub use gpu::Gpu;
pub use init::GpuInit;
