use crate::backend::{DeviceDescriptor, DeviceId, GraphicsRuntime, RuntimeOptions};
use crate::error::{ErrorDomain, RenderError, RenderResult};
use crate::handle::{Handle, HandleKind, HandleRegistry};

use super::preferences::DevicePreferences;
use super::select::select_device;

#[derive(Debug)]
struct ActiveDevice {
    handle: Handle,
    raw: DeviceId,
    descriptor: DeviceDescriptor,
}

/// Owns the graphics runtime session and the selected device.
///
/// Surfaces and buffers created on the device retain it; the device can only
/// be released once every dependent has let go.
#[derive(Debug, Default)]
pub struct DeviceContext {
    active: Option<ActiveDevice>,
    runtime_ready: bool,
    dependents: usize,
}

impl DeviceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes the runtime, selects the best device and creates it.
    ///
    /// On error the runtime is shut down again and the context stays empty.
    pub fn initialize<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        options: &RuntimeOptions,
        prefs: &DevicePreferences,
    ) -> RenderResult {
        if self.is_initialized() {
            return Err(RenderError::failure("device context already initialized"));
        }

        runtime.initialize(options).map_err(|e| {
            RenderError::critical_graphics(format!(
                "graphics runtime initialization failed: {}",
                e.message()
            ))
        })?;
        self.runtime_ready = true;

        match self.create_device(runtime, registry, prefs) {
            Ok(()) => Ok(()),
            Err(err) => {
                runtime.shutdown();
                self.runtime_ready = false;
                Err(err)
            }
        }
    }

    fn create_device<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        prefs: &DevicePreferences,
    ) -> RenderResult {
        let devices = runtime
            .enumerate_devices()
            .map_err(|e| RenderError::from_backend(ErrorDomain::Graphics, e))?;
        for d in &devices {
            log::debug!(
                "device {}: {} ({:?}, api {}, present: {})",
                d.index,
                d.name,
                d.device_type,
                d.api_version,
                d.supports_present
            );
        }

        let descriptor = select_device(&devices, prefs).cloned().ok_or_else(|| {
            RenderError::NoDevice(format!(
                "none of {} device(s) can present with the requested preferences",
                devices.len()
            ))
        })?;

        let raw = runtime
            .create_device(&descriptor)
            .map_err(|e| RenderError::from_backend(ErrorDomain::Graphics, e))?;
        let handle = registry.allocate(HandleKind::Device);

        log::info!(
            "selected device '{}' ({:?}, api {})",
            descriptor.name,
            descriptor.device_type,
            descriptor.api_version
        );
        self.active = Some(ActiveDevice {
            handle,
            raw,
            descriptor,
        });
        Ok(())
    }

    /// Releases the device and the runtime.
    ///
    /// Fails with `Failure`, leaving everything in place, while a surface or
    /// buffers still depend on the device.
    pub fn shutdown<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
    ) -> RenderResult {
        if self.dependents > 0 {
            return Err(RenderError::failure(format!(
                "device still has {} dependent(s)",
                self.dependents
            )));
        }

        let mut result = Ok(());
        if let Some(active) = self.active.take() {
            runtime.destroy_device(active.raw);
            result = registry.release(active.handle);
            log::debug!("device '{}' released", active.descriptor.name);
        }
        if self.runtime_ready {
            runtime.shutdown();
            self.runtime_ready = false;
        }
        result
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// Runtime id of the device; `Failure` when not initialized.
    pub fn raw(&self) -> RenderResult<DeviceId> {
        self.active
            .as_ref()
            .map(|a| a.raw)
            .ok_or_else(|| RenderError::failure("device context is not initialized"))
    }

    pub fn handle(&self) -> Option<Handle> {
        self.active.as_ref().map(|a| a.handle)
    }

    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.active.as_ref().map(|a| &a.descriptor)
    }

    pub fn dependents(&self) -> usize {
        self.dependents
    }

    pub(crate) fn retain(&mut self) {
        self.dependents += 1;
    }

    pub(crate) fn release_dependent(&mut self) {
        debug_assert!(self.dependents > 0, "unbalanced device release");
        self.dependents = self.dependents.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessConfig, HeadlessRuntime};
    use crate::backend::{BackendError, DeviceType};

    fn setup() -> (DeviceContext, HeadlessRuntime, HandleRegistry) {
        (
            DeviceContext::new(),
            HeadlessRuntime::new(HeadlessConfig::default()),
            HandleRegistry::new(),
        )
    }

    #[test]
    fn initialize_and_shutdown() {
        let (mut ctx, mut rt, mut reg) = setup();
        ctx.initialize(&mut rt, &mut reg, &RuntimeOptions::default(), &DevicePreferences::default())
            .unwrap();
        assert!(ctx.is_initialized());
        assert!(reg.is_valid(ctx.handle().unwrap()));
        assert_eq!(rt.live_devices(), 1);

        ctx.shutdown(&mut rt, &mut reg).unwrap();
        assert!(!ctx.is_initialized());
        assert_eq!(reg.live_count(), 0);
        assert_eq!(rt.live_devices(), 0);
        assert!(!rt.is_initialized());
    }

    #[test]
    fn runtime_failure_is_critical() {
        let (mut ctx, mut rt, mut reg) = setup();
        rt.fail_initialize = Some(BackendError::Recoverable("no loader".into()));
        let err = ctx
            .initialize(&mut rt, &mut reg, &RuntimeOptions::default(), &DevicePreferences::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::CriticalGraphics(_)));
        assert!(!ctx.is_initialized());
    }

    #[test]
    fn no_presentable_device() {
        let (mut ctx, mut rt, mut reg) = setup();
        rt.config_mut().devices[0].supports_present = false;
        let err = ctx
            .initialize(&mut rt, &mut reg, &RuntimeOptions::default(), &DevicePreferences::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::NoDevice(_)));
        assert!(!rt.is_initialized());
        assert_eq!(reg.live_count(), 0);
    }

    #[test]
    fn required_type_missing_is_no_device() {
        let (mut ctx, mut rt, mut reg) = setup();
        let prefs = DevicePreferences::default().with_required_type(DeviceType::Cpu);
        let err = ctx
            .initialize(&mut rt, &mut reg, &RuntimeOptions::default(), &prefs)
            .unwrap_err();
        assert_eq!(err.code(), 3);
    }

    #[test]
    fn device_creation_failure_keeps_severity() {
        let (mut ctx, mut rt, mut reg) = setup();
        rt.fail_create_device = Some(BackendError::Recoverable("busy".into()));
        let err = ctx
            .initialize(&mut rt, &mut reg, &RuntimeOptions::default(), &DevicePreferences::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::Graphics(_)));

        rt.fail_create_device = Some(BackendError::Critical("driver crashed".into()));
        let err = ctx
            .initialize(&mut rt, &mut reg, &RuntimeOptions::default(), &DevicePreferences::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::CriticalGraphics(_)));
        assert_eq!(reg.live_count(), 0);
    }

    #[test]
    fn shutdown_with_dependents_fails_untouched() {
        let (mut ctx, mut rt, mut reg) = setup();
        ctx.initialize(&mut rt, &mut reg, &RuntimeOptions::default(), &DevicePreferences::default())
            .unwrap();
        ctx.retain();

        let err = ctx.shutdown(&mut rt, &mut reg).unwrap_err();
        assert!(matches!(err, RenderError::Failure(_)));
        assert!(ctx.is_initialized());
        assert_eq!(rt.live_devices(), 1);

        ctx.release_dependent();
        ctx.shutdown(&mut rt, &mut reg).unwrap();
        assert_eq!(rt.live_devices(), 0);
    }

    #[test]
    fn double_initialize_is_failure() {
        let (mut ctx, mut rt, mut reg) = setup();
        let opts = RuntimeOptions::default();
        let prefs = DevicePreferences::default();
        ctx.initialize(&mut rt, &mut reg, &opts, &prefs).unwrap();
        assert!(matches!(
            ctx.initialize(&mut rt, &mut reg, &opts, &prefs),
            Err(RenderError::Failure(_))
        ));
        assert_eq!(rt.live_devices(), 1);
    }
}
