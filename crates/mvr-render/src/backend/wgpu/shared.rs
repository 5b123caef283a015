use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use winit::window::Window;

use crate::backend::{BackendError, Extent, WindowKey};
use crate::backend::SurfaceId;

/// A wgpu surface and the configuration last applied to it.
pub(super) struct SurfaceEntry {
    pub window: WindowKey,
    pub surface: wgpu::Surface<'static>,
    /// Size last reported through `poll_resize`.
    pub extent: Extent,
    pub config: Option<wgpu::SurfaceConfiguration>,
}

/// State shared by the window system and the runtime.
///
/// The instance is created by the runtime, surfaces are created from it by the
/// window system.
#[derive(Default)]
pub(super) struct Shared {
    pub instance: Option<wgpu::Instance>,
    pub windows: HashMap<WindowKey, Arc<Window>>,
    pub surfaces: HashMap<SurfaceId, SurfaceEntry>,
    next_id: u64,
}

impl Shared {
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub(super) type SharedHandle = Arc<Mutex<Shared>>;

pub(super) fn new_shared() -> SharedHandle {
    Arc::new(Mutex::new(Shared::default()))
}

pub(super) fn lock(shared: &SharedHandle) -> Result<MutexGuard<'_, Shared>, BackendError> {
    shared
        .lock()
        .map_err(|_| BackendError::Critical("wgpu backend state is poisoned".into()))
}
