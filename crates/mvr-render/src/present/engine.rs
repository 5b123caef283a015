use crate::backend::{BackendError, GraphicsRuntime, PresentStatus, SurfaceConfig};
use crate::device::DeviceContext;
use crate::error::{ErrorDomain, RenderError, RenderResult};
use crate::handle::{Buffer, HandleKind, HandleRegistry};
use crate::surface::SurfaceBinder;

use super::mode::PresentMode;
use super::rotation::{Rotation, SlotState};

/// Lifecycle of the presentation engine.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum EngineState {
    /// No buffers exist.
    #[default]
    Unconfigured,
    /// Buffers exist and match the surface.
    Ready,
    /// The surface changed; `configure` must run before the next acquire.
    Stale,
    /// The device is gone. Only teardown is possible.
    Lost,
}

/// Owns the buffer rotation and the per-frame acquire/present protocol.
#[derive(Debug, Default)]
pub struct PresentationEngine {
    state: EngineState,
    mode: PresentMode,
    depth: u32,
    rotation: Rotation,
    /// Whether device and surface are retained for the current rotation.
    retained: bool,
}

impl PresentationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Mode in effect; may differ from the requested one after a fallback.
    pub fn mode(&self) -> PresentMode {
        self.mode
    }

    /// Rotation depth; `0` while unconfigured.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Buffers held by the caller or still owned by the GPU.
    pub fn in_flight(&self) -> usize {
        self.rotation.in_flight()
    }

    pub fn buffers(&self) -> impl Iterator<Item = Buffer> + '_ {
        self.rotation.buffers()
    }

    /// (Re)builds the rotation for the surface's current geometry.
    ///
    /// Existing buffers are waited on and destroyed first. The hint is clamped
    /// into the range the mode and the surface allow; an unsupported mode
    /// falls back to [`PresentMode::Vsync`].
    pub fn configure<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        device: &mut DeviceContext,
        surface: &mut SurfaceBinder,
        mode: PresentMode,
        buffer_count_hint: u32,
    ) -> RenderResult {
        self.require_not_lost()?;
        let device_id = device.raw()?;
        let surface_id = surface.raw()?;

        self.release_rotation(runtime, registry, device, surface, true)?;

        let extent = surface.refresh();
        if extent.is_empty() {
            self.state = EngineState::Stale;
            return Err(RenderError::graphics(format!(
                "cannot configure a {}x{} surface",
                extent.width, extent.height
            )));
        }

        let caps = runtime
            .surface_capabilities(device_id, surface_id)
            .map_err(|e| self.configure_failed(e))?;
        let resolved = mode.resolve(&caps.present_modes);
        if resolved != mode {
            log::warn!("present mode {mode} not supported by the surface; falling back to {resolved}");
        }
        let depth = resolved.clamp_buffer_count(
            buffer_count_hint.max(caps.min_buffer_count),
            caps.max_buffer_count,
        );

        let config = SurfaceConfig {
            extent,
            present_mode: resolved,
            buffer_count: depth,
        };
        runtime
            .configure_surface(device_id, surface_id, &config)
            .map_err(|e| self.configure_failed(e))?;

        device.retain();
        surface.retain();
        self.retained = true;

        for _ in 0..depth {
            match runtime.create_presentable_buffer(device_id, surface_id) {
                Ok(raw) => {
                    let buffer = Buffer::from_handle(registry.allocate(HandleKind::Buffer));
                    self.rotation.push(buffer, raw);
                }
                Err(e) => {
                    let err = self.configure_failed(e);
                    // Fresh buffers were never presented; nothing to wait for.
                    let rollback = self.release_rotation(runtime, registry, device, surface, false);
                    if let Err(cleanup) = rollback {
                        log::warn!("buffer rollback: {cleanup}");
                    }
                    return Err(err);
                }
            }
        }

        self.mode = resolved;
        self.depth = depth;
        self.state = EngineState::Ready;
        log::info!(
            "presentation configured: {resolved}, {depth} buffer(s), {}x{}",
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// Returns the next buffer available for drawing.
    ///
    /// Under [`PresentMode::Vsync`] buffers come back in strict rotation order
    /// and the call blocks until the GPU releases the next one. Other modes
    /// return any buffer the GPU is done with and only wait when every buffer
    /// is still presented.
    pub fn acquire_next<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        device: &DeviceContext,
        surface: &SurfaceBinder,
    ) -> RenderResult<Buffer> {
        self.require_configured()?;
        if self.state == EngineState::Stale || surface.is_stale() {
            self.state = EngineState::Stale;
            return Err(RenderError::graphics("surface is out of date; reconfigure"));
        }
        if self.rotation.all_acquired() {
            return Err(RenderError::failure(format!(
                "all {} buffer(s) are already held by the caller",
                self.rotation.len()
            )));
        }
        let device_id = device.raw()?;

        let index = if self.mode.blocks_on_acquire() {
            self.rotation.next_in_order()
        } else {
            for i in self.rotation.presented() {
                if runtime.is_buffer_idle(device_id, self.rotation.slot(i).raw) {
                    self.rotation.set_state(i, SlotState::Free);
                }
            }
            self.rotation
                .first_free()
                .or_else(|| self.rotation.oldest_presented())
        };
        let Some(index) = index else {
            return Err(RenderError::failure("no buffer available"));
        };

        let slot = self.rotation.slot(index);
        if matches!(slot.state, SlotState::Presented { .. }) {
            let raw = slot.raw;
            runtime
                .wait_buffer_idle(device_id, raw)
                .map_err(|e| self.backend_failed(e))?;
        }

        self.rotation.set_state(index, SlotState::Acquired);
        Ok(self.rotation.slot(index).buffer)
    }

    /// Submits a held buffer for display. Ownership returns to the engine
    /// whatever the outcome.
    pub fn present<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        device: &DeviceContext,
        buffer: Buffer,
    ) -> RenderResult {
        self.require_configured()?;
        let index = self
            .rotation
            .find(buffer)
            .filter(|&i| self.rotation.slot(i).state == SlotState::Acquired)
            .ok_or_else(|| RenderError::failure(format!("{buffer:?} is not held by the caller")))?;
        let device_id = device.raw()?;
        let raw = self.rotation.slot(index).raw;

        match runtime.submit_present(device_id, raw) {
            Ok(PresentStatus::Presented) => {
                self.rotation.mark_presented(index);
                Ok(())
            }
            Ok(PresentStatus::Outdated) => {
                self.rotation.set_state(index, SlotState::Free);
                self.state = EngineState::Stale;
                Err(RenderError::graphics("surface is out of date; frame dropped"))
            }
            Ok(PresentStatus::DeviceLost) => {
                self.rotation.set_state(index, SlotState::Free);
                self.state = EngineState::Lost;
                Err(RenderError::critical_graphics("device lost during present"))
            }
            Err(e) => {
                self.rotation.set_state(index, SlotState::Free);
                Err(self.backend_failed(e))
            }
        }
    }

    /// Destroys every buffer and releases the device and surface.
    ///
    /// GPU-idle waits are skipped once the device is lost.
    pub fn teardown<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        device: &mut DeviceContext,
        surface: &mut SurfaceBinder,
    ) -> RenderResult {
        let wait = self.state != EngineState::Lost;
        let result = self.release_rotation(runtime, registry, device, surface, wait);
        self.state = EngineState::Unconfigured;
        self.depth = 0;
        result
    }

    fn release_rotation<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        device: &mut DeviceContext,
        surface: &mut SurfaceBinder,
        mut wait: bool,
    ) -> RenderResult {
        let mut first_err = None;

        if let Ok(device_id) = device.raw() {
            for slot in self.rotation.drain() {
                if wait && matches!(slot.state, SlotState::Presented { .. }) {
                    if let Err(e) = runtime.wait_buffer_idle(device_id, slot.raw) {
                        let err = self.backend_failed(e);
                        wait = !err.is_critical();
                        first_err.get_or_insert(err);
                    }
                }
                runtime.destroy_buffer(device_id, slot.raw);
                if let Err(e) = registry.release(slot.buffer.handle()) {
                    first_err.get_or_insert(e);
                }
            }
        }

        if self.retained {
            device.release_dependent();
            surface.release_dependent();
            self.retained = false;
        }
        self.depth = 0;
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn require_not_lost(&self) -> RenderResult {
        if self.state == EngineState::Lost {
            return Err(RenderError::critical_graphics("device lost; re-initialize"));
        }
        Ok(())
    }

    fn require_configured(&self) -> RenderResult {
        self.require_not_lost()?;
        if self.state == EngineState::Unconfigured {
            return Err(RenderError::failure("presentation engine is not configured"));
        }
        Ok(())
    }

    fn backend_failed(&mut self, err: BackendError) -> RenderError {
        let err = RenderError::from_backend(ErrorDomain::Graphics, err);
        if err.is_critical() {
            self.state = EngineState::Lost;
        }
        err
    }

    fn configure_failed(&mut self, err: BackendError) -> RenderError {
        let err = self.backend_failed(err);
        if !err.is_critical() {
            self.state = EngineState::Stale;
        }
        err
    }
}
