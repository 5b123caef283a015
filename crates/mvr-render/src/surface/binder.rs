use crate::backend::{
    Extent, GraphicsRuntime, SurfaceId, WindowDescriptor, WindowKey, WindowSystem,
};
use crate::device::DeviceContext;
use crate::error::{ErrorDomain, RenderError, RenderResult};
use crate::handle::{Handle, HandleKind, HandleRegistry};

use super::resize::ResizeSignal;

#[derive(Debug)]
struct BoundSurface {
    handle: Handle,
    raw: SurfaceId,
    window: WindowKey,
}

/// Owns the window-system surface and its binding to the device.
#[derive(Debug, Default)]
pub struct SurfaceBinder {
    bound: Option<BoundSurface>,
    signal: ResizeSignal,
    dependents: usize,
}

impl SurfaceBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a surface for the window and checks the device can present to it.
    ///
    /// On error nothing is left behind: a surface created along the way is
    /// destroyed before returning.
    pub fn bind<W: WindowSystem, G: GraphicsRuntime>(
        &mut self,
        window_system: &mut W,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        descriptor: &WindowDescriptor,
        device: &mut DeviceContext,
    ) -> RenderResult {
        if self.bound.is_some() {
            return Err(RenderError::failure("surface already bound"));
        }
        let device_id = device.raw()?;

        let raw = window_system
            .create_surface(descriptor)
            .map_err(|e| RenderError::from_backend(ErrorDomain::Windowing, e))?;

        let extent = window_system.surface_extent(raw).unwrap_or_default();
        if extent.is_empty() {
            window_system.destroy_surface(raw);
            return Err(RenderError::Windowing(format!(
                "window {:?} has zero size ({}x{})",
                descriptor.window, extent.width, extent.height
            )));
        }

        let caps = match runtime.surface_capabilities(device_id, raw) {
            Ok(caps) => caps,
            Err(e) => {
                window_system.destroy_surface(raw);
                return Err(RenderError::from_backend(ErrorDomain::Graphics, e));
            }
        };
        if !caps.is_presentable() {
            window_system.destroy_surface(raw);
            return Err(RenderError::graphics(
                "selected device cannot present to this surface",
            ));
        }

        let handle = registry.allocate(HandleKind::Surface);
        self.signal.reset(extent);
        self.bound = Some(BoundSurface {
            handle,
            raw,
            window: descriptor.window,
        });
        device.retain();

        log::debug!(
            "surface {raw:?} bound to window {:?} ({}x{})",
            descriptor.window,
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// Records new geometry and marks the surface stale. Buffers are not touched.
    pub fn on_resize(&self, extent: Extent) {
        self.signal.notify(extent);
    }

    /// Pulls a pending resize from the window system. Returns `true` if one was
    /// found.
    pub fn pump_resize<W: WindowSystem>(&self, window_system: &mut W) -> bool {
        let Some(bound) = &self.bound else {
            return false;
        };
        match window_system.poll_resize(bound.raw) {
            Some(extent) => {
                log::debug!("window {:?} resized to {}x{}", bound.window, extent.width, extent.height);
                self.on_resize(extent);
                true
            }
            None => false,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.signal.is_stale()
    }

    pub fn extent(&self) -> Extent {
        self.signal.extent()
    }

    /// Consumes the stale flag; returns the geometry to configure for.
    pub(crate) fn refresh(&self) -> Extent {
        self.signal.take()
    }

    pub fn resize_signal(&self) -> ResizeSignal {
        self.signal.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn handle(&self) -> Option<Handle> {
        self.bound.as_ref().map(|b| b.handle)
    }

    /// Window-system id of the surface; `Failure` when unbound.
    pub fn raw(&self) -> RenderResult<SurfaceId> {
        self.bound
            .as_ref()
            .map(|b| b.raw)
            .ok_or_else(|| RenderError::failure("no surface bound"))
    }

    pub(crate) fn retain(&mut self) {
        self.dependents += 1;
    }

    pub(crate) fn release_dependent(&mut self) {
        debug_assert!(self.dependents > 0, "unbalanced surface release");
        self.dependents = self.dependents.saturating_sub(1);
    }

    /// Destroys the surface. A no-op when nothing is bound.
    pub fn unbind<W: WindowSystem>(
        &mut self,
        window_system: &mut W,
        registry: &mut HandleRegistry,
        device: &mut DeviceContext,
    ) -> RenderResult {
        if self.dependents > 0 {
            return Err(RenderError::failure(format!(
                "surface still has {} dependent(s)",
                self.dependents
            )));
        }
        let Some(bound) = self.bound.take() else {
            return Ok(());
        };

        window_system.destroy_surface(bound.raw);
        device.release_dependent();
        log::debug!("surface {:?} unbound", bound.raw);
        registry.release(bound.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessConfig, HeadlessRuntime, HeadlessWindowSystem};
    use crate::backend::{BackendError, RuntimeOptions};
    use crate::device::DevicePreferences;

    struct Fixture {
        ws: HeadlessWindowSystem,
        rt: HeadlessRuntime,
        reg: HandleRegistry,
        device: DeviceContext,
        window: WindowDescriptor,
    }

    fn fixture(extent: Extent) -> Fixture {
        let mut ws = HeadlessWindowSystem::new();
        let window = ws.add_window(extent);
        let mut rt = HeadlessRuntime::new(HeadlessConfig::default());
        let mut reg = HandleRegistry::new();
        let mut device = DeviceContext::new();
        device
            .initialize(&mut rt, &mut reg, &RuntimeOptions::default(), &DevicePreferences::default())
            .unwrap();
        Fixture {
            ws,
            rt,
            reg,
            device,
            window,
        }
    }

    #[test]
    fn bind_and_unbind() {
        let mut f = fixture(Extent::new(640, 480));
        let mut binder = SurfaceBinder::new();
        binder
            .bind(&mut f.ws, &mut f.rt, &mut f.reg, &f.window, &mut f.device)
            .unwrap();
        assert!(binder.is_bound());
        assert_eq!(binder.extent(), Extent::new(640, 480));
        assert_eq!(f.device.dependents(), 1);
        assert_eq!(f.ws.live_surfaces(), 1);

        binder.unbind(&mut f.ws, &mut f.reg, &mut f.device).unwrap();
        binder.unbind(&mut f.ws, &mut f.reg, &mut f.device).unwrap();
        assert_eq!(f.device.dependents(), 0);
        assert_eq!(f.ws.live_surfaces(), 0);
        assert_eq!(f.reg.live_count_of(HandleKind::Surface), 0);
    }

    #[test]
    fn zero_sized_window_is_windowing_error() {
        let mut f = fixture(Extent::new(0, 480));
        let mut binder = SurfaceBinder::new();
        let err = binder
            .bind(&mut f.ws, &mut f.rt, &mut f.reg, &f.window, &mut f.device)
            .unwrap_err();
        assert!(matches!(err, RenderError::Windowing(_)));
        assert_eq!(f.ws.live_surfaces(), 0);
        assert_eq!(f.device.dependents(), 0);
    }

    #[test]
    fn unknown_window_is_windowing_error() {
        let mut f = fixture(Extent::new(640, 480));
        let mut binder = SurfaceBinder::new();
        let bogus = WindowDescriptor::new(WindowKey(999));
        let err = binder
            .bind(&mut f.ws, &mut f.rt, &mut f.reg, &bogus, &mut f.device)
            .unwrap_err();
        assert!(matches!(err, RenderError::Windowing(_)));
    }

    #[test]
    fn critical_window_system_failure() {
        let mut f = fixture(Extent::new(640, 480));
        f.ws.fail_next_surface = Some(BackendError::Critical("display gone".into()));
        let mut binder = SurfaceBinder::new();
        let err = binder
            .bind(&mut f.ws, &mut f.rt, &mut f.reg, &f.window, &mut f.device)
            .unwrap_err();
        assert!(matches!(err, RenderError::CriticalWindowing(_)));
    }

    #[test]
    fn unpresentable_surface_is_destroyed() {
        let mut f = fixture(Extent::new(640, 480));
        f.rt.reject_surfaces = true;
        let mut binder = SurfaceBinder::new();
        let err = binder
            .bind(&mut f.ws, &mut f.rt, &mut f.reg, &f.window, &mut f.device)
            .unwrap_err();
        assert!(matches!(err, RenderError::Graphics(_)));
        assert_eq!(f.ws.live_surfaces(), 0);
        assert_eq!(f.reg.live_count_of(HandleKind::Surface), 0);
    }

    #[test]
    fn resize_marks_stale_until_refreshed() {
        let mut f = fixture(Extent::new(640, 480));
        let mut binder = SurfaceBinder::new();
        binder
            .bind(&mut f.ws, &mut f.rt, &mut f.reg, &f.window, &mut f.device)
            .unwrap();

        assert!(!binder.pump_resize(&mut f.ws));
        f.ws.resize_window(f.window.window, Extent::new(1024, 768));
        assert!(binder.pump_resize(&mut f.ws));
        assert!(binder.is_stale());

        assert_eq!(binder.refresh(), Extent::new(1024, 768));
        assert!(!binder.is_stale());
    }

    #[test]
    fn unbind_with_dependents_fails() {
        let mut f = fixture(Extent::new(640, 480));
        let mut binder = SurfaceBinder::new();
        binder
            .bind(&mut f.ws, &mut f.rt, &mut f.reg, &f.window, &mut f.device)
            .unwrap();
        binder.retain();
        assert!(matches!(
            binder.unbind(&mut f.ws, &mut f.reg, &mut f.device),
            Err(RenderError::Failure(_))
        ));
        assert!(binder.is_bound());
        binder.release_dependent();
        binder.unbind(&mut f.ws, &mut f.reg, &mut f.device).unwrap();
    }
}
