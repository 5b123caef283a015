use super::types::{
    BackendError, BufferId, DataBufferId, DeviceDescriptor, DeviceId, Extent, PresentStatus,
    RuntimeOptions, SurfaceCapabilities, SurfaceConfig, SurfaceId, WindowDescriptor,
};

/// Windowing-system collaborator.
///
/// Owns windows and the surfaces created for them. The core never talks to the
/// platform directly.
pub trait WindowSystem {
    /// Creates a presentable surface for the described window.
    ///
    /// `Recoverable` when this window cannot get a surface, `Critical` when the
    /// windowing subsystem itself is unusable.
    fn create_surface(&mut self, descriptor: &WindowDescriptor) -> Result<SurfaceId, BackendError>;

    /// Current drawable size of the surface's window.
    fn surface_extent(&self, surface: SurfaceId) -> Option<Extent>;

    /// Returns the new size if the window was resized since the last poll.
    fn poll_resize(&mut self, surface: SurfaceId) -> Option<Extent>;

    fn destroy_surface(&mut self, surface: SurfaceId);
}

/// Graphics-API runtime collaborator.
///
/// Only initialization, buffer lifetime and present primitives are consumed;
/// command recording and pipelines stay outside the core.
pub trait GraphicsRuntime {
    /// Brings up the runtime. Any error here is unrecoverable.
    fn initialize(&mut self, options: &RuntimeOptions) -> Result<(), BackendError>;

    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>, BackendError>;

    fn create_device(&mut self, descriptor: &DeviceDescriptor) -> Result<DeviceId, BackendError>;

    fn surface_capabilities(
        &mut self,
        device: DeviceId,
        surface: SurfaceId,
    ) -> Result<SurfaceCapabilities, BackendError>;

    fn configure_surface(
        &mut self,
        device: DeviceId,
        surface: SurfaceId,
        config: &SurfaceConfig,
    ) -> Result<(), BackendError>;

    /// Creates one buffer matching the surface's current configuration.
    fn create_presentable_buffer(
        &mut self,
        device: DeviceId,
        surface: SurfaceId,
    ) -> Result<BufferId, BackendError>;

    fn submit_present(
        &mut self,
        device: DeviceId,
        buffer: BufferId,
    ) -> Result<PresentStatus, BackendError>;

    /// Non-blocking: has the GPU finished with this buffer?
    fn is_buffer_idle(&mut self, device: DeviceId, buffer: BufferId) -> bool;

    /// Blocks until the GPU has finished with this buffer.
    fn wait_buffer_idle(&mut self, device: DeviceId, buffer: BufferId) -> Result<(), BackendError>;

    fn destroy_buffer(&mut self, device: DeviceId, buffer: BufferId);

    /// Offset alignment every suballocated data range must honour.
    fn data_alignment(&mut self, device: DeviceId) -> Result<u64, BackendError>;

    /// Creates a GPU buffer usable as vertex, index, uniform or storage data.
    fn create_data_buffer(
        &mut self,
        device: DeviceId,
        size: u64,
    ) -> Result<DataBufferId, BackendError>;

    /// Copies `data` into the buffer at `offset`. Ordered before the next present.
    fn write_data_buffer(
        &mut self,
        device: DeviceId,
        buffer: DataBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError>;

    fn destroy_data_buffer(&mut self, device: DeviceId, buffer: DataBufferId);

    fn destroy_device(&mut self, device: DeviceId);

    /// Releases the runtime. Safe to call when not initialized.
    fn shutdown(&mut self);
}
