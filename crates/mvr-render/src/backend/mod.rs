//! Collaborator interfaces and their implementations.
//!
//! The core consumes a [`WindowSystem`] and a [`GraphicsRuntime`]. Two
//! implementations ship with the crate:
//! - [`wgpu`]: winit windows presented through wgpu
//! - [`headless`]: deterministic in-memory fakes with fault injection

pub mod headless;
pub mod wgpu;

mod traits;
mod types;

pub use traits::{GraphicsRuntime, WindowSystem};
pub use types::{
    ApiVersion, BackendError, BufferId, DataBufferId, DeviceDescriptor, DeviceId, DeviceType,
    Extent, PresentStatus, RuntimeOptions, SurfaceCapabilities, SurfaceConfig, SurfaceId,
    WindowDescriptor, WindowKey,
};
