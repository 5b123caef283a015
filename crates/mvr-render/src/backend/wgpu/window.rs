use std::sync::Arc;

use winit::window::Window;

use crate::backend::{
    BackendError, Extent, SurfaceId, WindowDescriptor, WindowKey, WindowSystem,
};

use super::shared::{lock, SharedHandle, Shared, SurfaceEntry};

/// Window system over winit windows.
///
/// Windows are registered by the application (winit only creates them inside
/// the event loop). Surfaces come from the wgpu instance owned by
/// [`WgpuRuntime`](super::WgpuRuntime).
pub struct WinitWindowSystem {
    shared: SharedHandle,
}

impl WinitWindowSystem {
    pub(super) fn new(shared: SharedHandle) -> Self {
        Self { shared }
    }

    /// Makes a window available for surface creation.
    ///
    /// `Critical` when the shared backend state is poisoned; nothing is
    /// registered then.
    pub fn register_window(
        &mut self,
        window: Arc<Window>,
    ) -> Result<WindowDescriptor, BackendError> {
        let key = WindowKey(u64::from(window.id()));
        lock(&self.shared)?.windows.insert(key, window);
        Ok(WindowDescriptor::new(key))
    }

    /// Forgets a window. Surfaces already created for it stay alive until
    /// destroyed.
    pub fn unregister_window(&mut self, window: WindowKey) {
        if let Ok(mut shared) = lock(&self.shared) {
            shared.windows.remove(&window);
        }
    }
}

fn window_extent(shared: &Shared, window: WindowKey) -> Option<Extent> {
    shared.windows.get(&window).map(|w| w.inner_size().into())
}

impl WindowSystem for WinitWindowSystem {
    fn create_surface(&mut self, descriptor: &WindowDescriptor) -> Result<SurfaceId, BackendError> {
        let mut shared = lock(&self.shared)?;

        let window = shared.windows.get(&descriptor.window).cloned().ok_or_else(|| {
            BackendError::Recoverable(format!("window {:?} is not registered", descriptor.window))
        })?;
        let instance = shared.instance.as_ref().ok_or_else(|| {
            BackendError::Critical("wgpu instance is not initialized".into())
        })?;

        let extent: Extent = window.inner_size().into();
        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError::Recoverable(format!("failed to create surface: {e}")))?;

        let id = SurfaceId(shared.next_id());
        shared.surfaces.insert(
            id,
            SurfaceEntry {
                window: descriptor.window,
                surface,
                extent,
                config: None,
            },
        );
        log::debug!("created surface {id:?} for window {:?} ({extent:?})", descriptor.window);
        Ok(id)
    }

    fn surface_extent(&self, surface: SurfaceId) -> Option<Extent> {
        let shared = lock(&self.shared).ok()?;
        let entry = shared.surfaces.get(&surface)?;
        window_extent(&shared, entry.window)
    }

    fn poll_resize(&mut self, surface: SurfaceId) -> Option<Extent> {
        let mut shared = lock(&self.shared).ok()?;
        let window = shared.surfaces.get(&surface)?.window;
        let current = window_extent(&shared, window)?;

        let entry = shared.surfaces.get_mut(&surface)?;
        if entry.extent == current {
            return None;
        }
        entry.extent = current;
        Some(current)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        if let Ok(mut shared) = lock(&self.shared) {
            shared.surfaces.remove(&surface);
        }
    }
}
