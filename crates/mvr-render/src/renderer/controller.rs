use crate::backend::{
    DeviceDescriptor, GraphicsRuntime, RuntimeOptions, WindowDescriptor, WindowSystem,
};
use crate::device::{DeviceContext, DevicePreferences};
use crate::error::{RenderError, RenderResult};
use crate::handle::{Buffer, DataBuffer, HandleRegistry};
use crate::logging::{clear_last_error, last_error, set_last_error};
use crate::memory::{DataAllocator, DataRegion};
use crate::present::{EngineState, PresentMode, PresentationEngine};
use crate::surface::{ResizeSignal, SurfaceBinder};

use super::params::InitializeParams;

#[derive(Debug)]
enum Session {
    Idle,
    Running,
    /// A critical error was reported; only shutdown/initialize may proceed.
    Critical(RenderError),
}

/// One presentation session over a window system and a graphics runtime.
///
/// Owns the handle registry, device context, surface binder, presentation
/// engine and data buffers. Initialization runs device → surface → rotation;
/// teardown runs in reverse. Every method takes `&mut self`, so calls are
/// serialized by the borrow checker.
///
/// The registry outlives sessions: released slots come back with a new
/// generation, so a handle kept from an earlier session stays invalid.
pub struct Renderer<W: WindowSystem, G: GraphicsRuntime> {
    window_system: W,
    runtime: G,
    registry: HandleRegistry,
    device: DeviceContext,
    surface: SurfaceBinder,
    engine: PresentationEngine,
    memory: DataAllocator,
    session: Session,
}

impl<W: WindowSystem, G: GraphicsRuntime> Renderer<W, G> {
    pub fn new(window_system: W, runtime: G) -> Self {
        Self {
            window_system,
            runtime,
            registry: HandleRegistry::new(),
            device: DeviceContext::new(),
            surface: SurfaceBinder::new(),
            engine: PresentationEngine::new(),
            memory: DataAllocator::new(),
            session: Session::Idle,
        }
    }

    /// Brings up device, surface and buffer rotation.
    ///
    /// The first failing step's error is returned unchanged after everything
    /// already created has been torn down. `Failure` while a session exists.
    pub fn initialize(&mut self, params: InitializeParams) -> RenderResult {
        if !matches!(self.session, Session::Idle) {
            return self.settle(Err(RenderError::failure(
                "renderer already initialized; shut it down first",
            )));
        }

        let InitializeParams {
            window,
            present_mode,
            buffer_count_hint,
            device,
            debug,
            application_name,
        } = params;
        let options = RuntimeOptions {
            application_name,
            debug,
        };

        log::info!(
            "initializing '{}' ({present_mode}, {buffer_count_hint} buffer(s) requested)",
            options.application_name
        );

        match self.bring_up(&window, &options, &device, present_mode, buffer_count_hint) {
            Ok(()) => {
                self.session = Session::Running;
                clear_last_error();
                Ok(())
            }
            Err(err) => {
                self.tear_down();
                self.settle(Err(err))
            }
        }
    }

    fn bring_up(
        &mut self,
        window: &WindowDescriptor,
        options: &RuntimeOptions,
        prefs: &DevicePreferences,
        mode: PresentMode,
        hint: u32,
    ) -> RenderResult {
        self.device
            .initialize(&mut self.runtime, &mut self.registry, options, prefs)?;
        self.surface.bind(
            &mut self.window_system,
            &mut self.runtime,
            &mut self.registry,
            window,
            &mut self.device,
        )?;
        self.engine.configure(
            &mut self.runtime,
            &mut self.registry,
            &mut self.device,
            &mut self.surface,
            mode,
            hint,
        )
    }

    /// Tears the session down in reverse order. A no-op when not initialized.
    ///
    /// Never fails; problems along the way are logged.
    pub fn shutdown(&mut self) {
        if matches!(self.session, Session::Idle) {
            return;
        }
        self.tear_down();
        log::info!("renderer shut down");
    }

    fn tear_down(&mut self) {
        if let Err(err) = self.engine.teardown(
            &mut self.runtime,
            &mut self.registry,
            &mut self.device,
            &mut self.surface,
        ) {
            log::warn!("buffer teardown: {err}");
        }
        if let Err(err) = self.memory.teardown(
            &mut self.runtime,
            &mut self.registry,
            &mut self.device,
        ) {
            log::warn!("data buffer teardown: {err}");
        }
        if let Err(err) =
            self.surface
                .unbind(&mut self.window_system, &mut self.registry, &mut self.device)
        {
            log::warn!("surface teardown: {err}");
        }
        if !self.surface.is_bound() {
            // Resize signals handed out for the old surface must not reach the next one.
            self.surface = SurfaceBinder::new();
        }
        if let Err(err) = self.device.shutdown(&mut self.runtime, &mut self.registry) {
            log::warn!("device teardown: {err}");
        }

        let leaked = self.registry.live_count();
        if leaked > 0 {
            log::error!("{leaked} handle(s) still live after teardown");
        }
        self.engine = PresentationEngine::new();
        self.session = Session::Idle;
    }

    /// Returns the next buffer to draw into.
    ///
    /// May block under [`PresentMode::Vsync`]. `Graphics` once the surface
    /// was resized: call [`reconfigure`](Self::reconfigure) before retrying.
    pub fn acquire_next(&mut self) -> RenderResult<Buffer> {
        let result = self.check_session().and_then(|()| {
            self.engine
                .acquire_next(&mut self.runtime, &self.device, &self.surface)
        });
        self.settle(result)
    }

    /// Submits a buffer obtained from [`acquire_next`](Self::acquire_next).
    ///
    /// Once the frame is shown, every temporary data buffer stops being valid.
    pub fn present(&mut self, buffer: Buffer) -> RenderResult {
        let result = self
            .check_session()
            .and_then(|()| self.engine.present(&mut self.runtime, &self.device, buffer));
        if result.is_ok() {
            self.memory.end_frame(&mut self.registry);
        }
        self.settle(result)
    }

    /// Reserves `size` bytes of data valid until the next successful present.
    pub fn allocate_temp_buffer(&mut self, size: u64) -> RenderResult<DataBuffer> {
        let result = self.check_session().and_then(|()| {
            self.memory
                .allocate_temp(&mut self.runtime, &mut self.registry, &mut self.device, size)
        });
        self.settle(result)
    }

    /// Uploads `data` into a buffer valid until the next successful present.
    pub fn create_temp_buffer<T: bytemuck::Pod>(
        &mut self,
        data: &[T],
    ) -> RenderResult<DataBuffer> {
        let result = self.check_session().and_then(|()| {
            self.memory.create_temp(
                &mut self.runtime,
                &mut self.registry,
                &mut self.device,
                bytemuck::cast_slice(data),
            )
        });
        self.settle(result)
    }

    /// Creates a `size` byte buffer that lives until
    /// [`destroy_buffer`](Self::destroy_buffer) or shutdown.
    pub fn allocate_buffer(&mut self, size: u64) -> RenderResult<DataBuffer> {
        let result = self.check_session().and_then(|()| {
            self.memory.allocate_permanent(
                &mut self.runtime,
                &mut self.registry,
                &mut self.device,
                size,
            )
        });
        self.settle(result)
    }

    /// Creates a permanent buffer holding `data`.
    pub fn create_buffer<T: bytemuck::Pod>(&mut self, data: &[T]) -> RenderResult<DataBuffer> {
        let result = self.check_session().and_then(|()| {
            self.memory.create_permanent(
                &mut self.runtime,
                &mut self.registry,
                &mut self.device,
                bytemuck::cast_slice(data),
            )
        });
        self.settle(result)
    }

    /// Writes `data` into a live data buffer, `offset` bytes from its start.
    pub fn write_buffer<T: bytemuck::Pod>(
        &mut self,
        buffer: DataBuffer,
        offset: u64,
        data: &[T],
    ) -> RenderResult {
        let result = self.check_session().and_then(|()| {
            self.memory.write(
                &mut self.runtime,
                &self.device,
                buffer,
                offset,
                bytemuck::cast_slice(data),
            )
        });
        self.settle(result)
    }

    /// Destroys a permanent data buffer.
    pub fn destroy_buffer(&mut self, buffer: DataBuffer) -> RenderResult {
        let result = self.check_session().and_then(|()| {
            self.memory
                .destroy(&mut self.runtime, &mut self.registry, &self.device, buffer)
        });
        self.settle(result)
    }

    /// Runtime buffer and byte range behind a live data buffer.
    pub fn buffer_region(&self, buffer: DataBuffer) -> Option<DataRegion> {
        self.memory.region(buffer)
    }

    /// Rebuilds the buffer rotation, e.g. after a resize.
    pub fn reconfigure(&mut self, mode: PresentMode, buffer_count_hint: u32) -> RenderResult {
        let result = self.check_session().and_then(|()| {
            self.engine.configure(
                &mut self.runtime,
                &mut self.registry,
                &mut self.device,
                &mut self.surface,
                mode,
                buffer_count_hint,
            )
        });
        self.settle(result)
    }

    /// Pulls pending resizes from the window system. Returns `true` when the
    /// surface became stale.
    pub fn poll_events(&mut self) -> bool {
        if !matches!(self.session, Session::Running) {
            return false;
        }
        self.surface.pump_resize(&mut self.window_system)
    }

    /// Notifier for resizes observed on other threads.
    pub fn resize_signal(&self) -> ResizeSignal {
        self.surface.resize_signal()
    }

    /// Message of the last failure reported on this thread.
    pub fn last_error(&self) -> String {
        last_error()
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.session, Session::Idle)
    }

    /// Mode in effect; `None` when not initialized.
    pub fn present_mode(&self) -> Option<PresentMode> {
        self.is_initialized().then(|| self.engine.mode())
    }

    pub fn buffer_count(&self) -> u32 {
        self.engine.depth()
    }

    pub fn in_flight(&self) -> usize {
        self.engine.in_flight()
    }

    /// Handles live in the registry.
    pub fn live_handles(&self) -> usize {
        self.registry.live_count()
    }

    /// Live temporary and permanent data buffers.
    pub fn data_buffers(&self) -> usize {
        self.memory.temp_count() + self.memory.permanent_count()
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn selected_device(&self) -> Option<&DeviceDescriptor> {
        self.device.descriptor()
    }

    pub fn window_system(&self) -> &W {
        &self.window_system
    }

    pub fn window_system_mut(&mut self) -> &mut W {
        &mut self.window_system
    }

    pub fn graphics(&self) -> &G {
        &self.runtime
    }

    pub fn graphics_mut(&mut self) -> &mut G {
        &mut self.runtime
    }

    fn check_session(&self) -> RenderResult {
        match &self.session {
            Session::Running => Ok(()),
            Session::Idle => Err(RenderError::failure("renderer is not initialized")),
            Session::Critical(err) => Err(err.clone()),
        }
    }

    /// Records failures; a critical one sticks to the session.
    fn settle<T>(&mut self, result: RenderResult<T>) -> RenderResult<T> {
        if let Err(err) = &result {
            if err.is_critical() {
                log::error!("{err}");
                if matches!(self.session, Session::Running) {
                    self.session = Session::Critical(err.clone());
                }
            } else {
                log::warn!("{err}");
            }
            set_last_error(err.to_string());
        }
        result
    }
}

impl<W: WindowSystem, G: GraphicsRuntime> Drop for Renderer<W, G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
