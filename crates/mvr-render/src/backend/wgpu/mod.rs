//! wgpu + winit backend.
//!
//! Windows are registered as `Arc<winit::window::Window>`, surfaces and devices
//! come from wgpu. Presentable buffers are offscreen textures; presenting one
//! copies it into the surface texture and presents that.

mod runtime;
mod shared;
mod window;

pub use runtime::{GpuInit, WgpuRuntime};
pub use window::WinitWindowSystem;

/// Creates a window system and a runtime sharing one wgpu instance.
pub fn backend(init: GpuInit) -> (WinitWindowSystem, WgpuRuntime) {
    let shared = shared::new_shared();
    (
        WinitWindowSystem::new(shared.clone()),
        WgpuRuntime::new(shared, init),
    )
}
