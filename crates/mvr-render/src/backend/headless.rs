//! Deterministic in-memory backend.
//!
//! Runs the whole presentation protocol without a GPU or a display. Presented
//! buffers stay "on the GPU" until `present_latency` later presents have been
//! submitted or someone waits on them, which makes pacing observable in tests.
//! Public fault-injection fields let callers exercise every failure path.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::present::PresentMode;

use super::traits::{GraphicsRuntime, WindowSystem};
use super::types::{
    ApiVersion, BackendError, BufferId, DataBufferId, DeviceDescriptor, DeviceId, DeviceType,
    Extent, PresentStatus, RuntimeOptions, SurfaceCapabilities, SurfaceConfig, SurfaceId,
    WindowDescriptor, WindowKey,
};

/// Configuration of the headless runtime.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Devices reported by enumeration (`index` is rewritten to the position).
    pub devices: Vec<DeviceDescriptor>,
    /// Present modes every surface supports.
    pub present_modes: Vec<PresentMode>,
    pub min_buffer_count: u32,
    pub max_buffer_count: Option<u32>,
    /// Number of later presents after which a presented buffer is retired.
    pub present_latency: usize,
    /// Offset alignment reported for data buffers.
    pub data_alignment: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            devices: vec![DeviceDescriptor {
                index: 0,
                name: "headless discrete".to_string(),
                device_type: DeviceType::DiscreteGpu,
                api_version: ApiVersion::new(1, 3),
                supports_present: true,
            }],
            present_modes: PresentMode::ALL.to_vec(),
            min_buffer_count: 1,
            max_buffer_count: Some(8),
            present_latency: 1,
            data_alignment: 256,
        }
    }
}

/// Counters exposed for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub presents: usize,
    /// Number of `wait_buffer_idle` calls that actually had to wait.
    pub blocking_waits: usize,
    pub buffers_created: usize,
    pub data_buffers_created: usize,
    pub data_writes: usize,
}

// ── window system ─────────────────────────────────────────────────────────

/// In-memory windows and surfaces.
#[derive(Debug, Default)]
pub struct HeadlessWindowSystem {
    windows: HashMap<WindowKey, Extent>,
    surfaces: HashMap<SurfaceId, WindowKey>,
    pending_resize: HashMap<WindowKey, Extent>,
    next_id: u64,

    /// Returned (once) by the next `create_surface`.
    pub fail_next_surface: Option<BackendError>,
}

impl HeadlessWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a window and returns a descriptor for it.
    pub fn add_window(&mut self, extent: Extent) -> WindowDescriptor {
        self.next_id += 1;
        let key = WindowKey(self.next_id);
        self.windows.insert(key, extent);
        WindowDescriptor::new(key)
    }

    /// Resizes a window; the change is reported by the next `poll_resize`.
    pub fn resize_window(&mut self, window: WindowKey, extent: Extent) {
        if let Some(current) = self.windows.get_mut(&window) {
            *current = extent;
            self.pending_resize.insert(window, extent);
        }
    }

    pub fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }
}

impl WindowSystem for HeadlessWindowSystem {
    fn create_surface(&mut self, descriptor: &WindowDescriptor) -> Result<SurfaceId, BackendError> {
        if let Some(err) = self.fail_next_surface.take() {
            return Err(err);
        }
        if !self.windows.contains_key(&descriptor.window) {
            return Err(BackendError::Recoverable(format!(
                "unknown window {:?}",
                descriptor.window
            )));
        }

        self.next_id += 1;
        let id = SurfaceId(self.next_id);
        self.surfaces.insert(id, descriptor.window);
        Ok(id)
    }

    fn surface_extent(&self, surface: SurfaceId) -> Option<Extent> {
        let window = self.surfaces.get(&surface)?;
        self.windows.get(window).copied()
    }

    fn poll_resize(&mut self, surface: SurfaceId) -> Option<Extent> {
        let window = self.surfaces.get(&surface)?;
        self.pending_resize.remove(window)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface);
    }
}

// ── graphics runtime ──────────────────────────────────────────────────────

#[derive(Debug)]
struct HeadlessBuffer {
    device: DeviceId,
    surface: SurfaceId,
}

#[derive(Debug)]
struct HeadlessData {
    device: DeviceId,
    bytes: Vec<u8>,
}

/// In-memory graphics runtime.
#[derive(Debug, Default)]
pub struct HeadlessRuntime {
    config: HeadlessConfig,
    initialized: bool,
    last_options: Option<RuntimeOptions>,
    devices: HashSet<DeviceId>,
    lost: bool,
    configured: HashMap<SurfaceId, SurfaceConfig>,
    buffers: HashMap<BufferId, HeadlessBuffer>,
    in_flight: VecDeque<BufferId>,
    data: HashMap<DataBufferId, HeadlessData>,
    next_id: u64,
    stats: HeadlessStats,

    /// Returned (once) by the next `initialize`.
    pub fail_initialize: Option<BackendError>,
    /// Returned (once) by the next `create_device`.
    pub fail_create_device: Option<BackendError>,
    /// Returned by `create_presentable_buffer` after this many more successes.
    pub fail_buffer_after: Option<(usize, BackendError)>,
    /// Makes every surface report no present support.
    pub reject_surfaces: bool,
    /// Overrides (once) the outcome of the next `submit_present`.
    pub next_present_status: Option<PresentStatus>,
    /// Returned (once) by the next `create_data_buffer`.
    pub fail_data_buffer: Option<BackendError>,
}

impl HeadlessRuntime {
    pub fn new(config: HeadlessConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config_mut(&mut self) -> &mut HeadlessConfig {
        &mut self.config
    }

    /// Simulates device loss: every later call reports it.
    pub fn lose_device(&mut self) {
        self.lost = true;
    }

    /// Retires every presented buffer.
    pub fn retire_all(&mut self) {
        self.in_flight.clear();
    }

    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn last_options(&self) -> Option<&RuntimeOptions> {
        self.last_options.as_ref()
    }

    pub fn live_devices(&self) -> usize {
        self.devices.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_data_buffers(&self) -> usize {
        self.data.len()
    }

    /// Bytes stored in a data buffer.
    pub fn data_contents(&self, buffer: DataBufferId) -> Option<&[u8]> {
        self.data.get(&buffer).map(|d| d.bytes.as_slice())
    }

    /// Buffers currently owned by the GPU, oldest first.
    pub fn in_flight(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.in_flight.iter().copied()
    }

    fn require_initialized(&self) -> Result<(), BackendError> {
        if self.initialized {
            Ok(())
        } else {
            Err(BackendError::Critical("headless runtime is not initialized".into()))
        }
    }

    fn require_device(&self, device: DeviceId) -> Result<(), BackendError> {
        if self.lost {
            return Err(BackendError::Critical("device lost".into()));
        }
        if self.devices.contains(&device) {
            Ok(())
        } else {
            Err(BackendError::Recoverable(format!("unknown device {device:?}")))
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsRuntime for HeadlessRuntime {
    fn initialize(&mut self, options: &RuntimeOptions) -> Result<(), BackendError> {
        if let Some(err) = self.fail_initialize.take() {
            return Err(err);
        }
        self.initialized = true;
        self.lost = false;
        self.last_options = Some(options.clone());
        Ok(())
    }

    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>, BackendError> {
        self.require_initialized()?;
        Ok(self
            .config
            .devices
            .iter()
            .enumerate()
            .map(|(i, d)| DeviceDescriptor {
                index: i as u32,
                ..d.clone()
            })
            .collect())
    }

    fn create_device(&mut self, descriptor: &DeviceDescriptor) -> Result<DeviceId, BackendError> {
        self.require_initialized()?;
        if let Some(err) = self.fail_create_device.take() {
            return Err(err);
        }
        if descriptor.index as usize >= self.config.devices.len() {
            return Err(BackendError::Recoverable(format!(
                "no device at index {}",
                descriptor.index
            )));
        }

        let id = DeviceId(self.next_id());
        self.devices.insert(id);
        Ok(id)
    }

    fn surface_capabilities(
        &mut self,
        device: DeviceId,
        _surface: SurfaceId,
    ) -> Result<SurfaceCapabilities, BackendError> {
        self.require_device(device)?;
        let present_modes = if self.reject_surfaces {
            Vec::new()
        } else {
            self.config.present_modes.clone()
        };
        Ok(SurfaceCapabilities {
            present_modes,
            min_buffer_count: self.config.min_buffer_count,
            max_buffer_count: self.config.max_buffer_count,
        })
    }

    fn configure_surface(
        &mut self,
        device: DeviceId,
        surface: SurfaceId,
        config: &SurfaceConfig,
    ) -> Result<(), BackendError> {
        self.require_device(device)?;
        if config.extent.is_empty() {
            return Err(BackendError::Recoverable("surface has zero size".into()));
        }
        self.configured.insert(surface, *config);
        Ok(())
    }

    fn create_presentable_buffer(
        &mut self,
        device: DeviceId,
        surface: SurfaceId,
    ) -> Result<BufferId, BackendError> {
        self.require_device(device)?;
        if !self.configured.contains_key(&surface) {
            return Err(BackendError::Recoverable("surface is not configured".into()));
        }
        if let Some((remaining, err)) = self.fail_buffer_after.take() {
            if remaining == 0 {
                return Err(err);
            }
            self.fail_buffer_after = Some((remaining - 1, err));
        }

        let id = BufferId(self.next_id());
        self.buffers.insert(id, HeadlessBuffer { device, surface });
        self.stats.buffers_created += 1;
        Ok(id)
    }

    fn submit_present(
        &mut self,
        device: DeviceId,
        buffer: BufferId,
    ) -> Result<PresentStatus, BackendError> {
        if self.lost {
            return Ok(PresentStatus::DeviceLost);
        }
        if let Some(status) = self.next_present_status.take() {
            if status == PresentStatus::DeviceLost {
                self.lost = true;
            }
            return Ok(status);
        }
        self.require_device(device)?;
        match self.buffers.get(&buffer) {
            Some(b) if b.device == device && self.configured.contains_key(&b.surface) => {}
            _ => {
                return Err(BackendError::Recoverable(format!(
                    "buffer {buffer:?} is not presentable"
                )));
            }
        }

        self.in_flight.push_back(buffer);
        while self.in_flight.len() > self.config.present_latency {
            self.in_flight.pop_front();
        }
        self.stats.presents += 1;
        Ok(PresentStatus::Presented)
    }

    fn is_buffer_idle(&mut self, _device: DeviceId, buffer: BufferId) -> bool {
        !self.in_flight.contains(&buffer)
    }

    fn wait_buffer_idle(&mut self, device: DeviceId, buffer: BufferId) -> Result<(), BackendError> {
        self.require_device(device)?;
        if !self.in_flight.contains(&buffer) {
            return Ok(());
        }

        self.stats.blocking_waits += 1;
        // Every "vblank" retires the oldest presented buffer.
        while let Some(retired) = self.in_flight.pop_front() {
            if retired == buffer {
                break;
            }
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, _device: DeviceId, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.in_flight.retain(|b| *b != buffer);
    }

    fn data_alignment(&mut self, device: DeviceId) -> Result<u64, BackendError> {
        self.require_device(device)?;
        Ok(self.config.data_alignment)
    }

    fn create_data_buffer(
        &mut self,
        device: DeviceId,
        size: u64,
    ) -> Result<DataBufferId, BackendError> {
        self.require_device(device)?;
        if let Some(err) = self.fail_data_buffer.take() {
            return Err(err);
        }
        let len = usize::try_from(size)
            .map_err(|_| BackendError::Recoverable(format!("{size} bytes do not fit in memory")))?;

        let id = DataBufferId(self.next_id());
        self.data.insert(
            id,
            HeadlessData {
                device,
                bytes: vec![0; len],
            },
        );
        self.stats.data_buffers_created += 1;
        Ok(id)
    }

    fn write_data_buffer(
        &mut self,
        device: DeviceId,
        buffer: DataBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.require_device(device)?;
        let target = self
            .data
            .get_mut(&buffer)
            .filter(|d| d.device == device)
            .ok_or_else(|| BackendError::Recoverable(format!("unknown data buffer {buffer:?}")))?;

        let capacity = target.bytes.len();
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(data.len())?))
            .filter(|range| range.end <= capacity)
            .ok_or_else(|| {
                BackendError::Recoverable(format!(
                    "write of {} byte(s) at {offset} overruns {buffer:?}",
                    data.len()
                ))
            })?;
        target.bytes[range].copy_from_slice(data);
        self.stats.data_writes += 1;
        Ok(())
    }

    fn destroy_data_buffer(&mut self, _device: DeviceId, buffer: DataBufferId) {
        self.data.remove(&buffer);
    }

    fn destroy_device(&mut self, device: DeviceId) {
        self.devices.remove(&device);
        self.buffers.retain(|_, b| b.device != device);
        self.data.retain(|_, d| d.device != device);
    }

    fn shutdown(&mut self) {
        self.initialized = false;
        self.devices.clear();
        self.buffers.clear();
        self.data.clear();
        self.configured.clear();
        self.in_flight.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime_with_device() -> (HeadlessRuntime, DeviceId) {
        let mut rt = HeadlessRuntime::new(HeadlessConfig::default());
        rt.initialize(&RuntimeOptions::default()).unwrap();
        let devices = rt.enumerate_devices().unwrap();
        let device = rt.create_device(&devices[0]).unwrap();
        (rt, device)
    }

    #[test]
    fn enumerate_requires_initialize() {
        let mut rt = HeadlessRuntime::default();
        assert!(rt.enumerate_devices().unwrap_err().is_critical());
    }

    #[test]
    fn presented_buffer_retires_after_latency() {
        let (mut rt, device) = runtime_with_device();
        let surface = SurfaceId(100);
        rt.configure_surface(
            device,
            surface,
            &SurfaceConfig {
                extent: Extent::new(4, 4),
                present_mode: PresentMode::Vsync,
                buffer_count: 2,
            },
        )
        .unwrap();
        let a = rt.create_presentable_buffer(device, surface).unwrap();
        let b = rt.create_presentable_buffer(device, surface).unwrap();

        assert_eq!(rt.submit_present(device, a), Ok(PresentStatus::Presented));
        assert!(!rt.is_buffer_idle(device, a));
        assert_eq!(rt.submit_present(device, b), Ok(PresentStatus::Presented));
        assert!(rt.is_buffer_idle(device, a));
        assert!(!rt.is_buffer_idle(device, b));

        rt.wait_buffer_idle(device, b).unwrap();
        assert!(rt.is_buffer_idle(device, b));
        assert_eq!(rt.stats().blocking_waits, 1);
    }

    #[test]
    fn lost_device_reports_on_present() {
        let (mut rt, device) = runtime_with_device();
        rt.lose_device();
        assert_eq!(rt.submit_present(device, BufferId(1)), Ok(PresentStatus::DeviceLost));
        assert!(rt.wait_buffer_idle(device, BufferId(1)).unwrap_err().is_critical());
    }

    #[test]
    fn data_writes_land_in_bounds_only() {
        let (mut rt, device) = runtime_with_device();
        let buffer = rt.create_data_buffer(device, 8).unwrap();

        rt.write_data_buffer(device, buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(rt.data_contents(buffer), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
        assert!(rt.write_data_buffer(device, buffer, 6, &[9, 9, 9]).is_err());
        assert_eq!(rt.stats().data_writes, 1);

        rt.destroy_data_buffer(device, buffer);
        assert_eq!(rt.live_data_buffers(), 0);
    }

    #[test]
    fn window_resize_is_polled_once() {
        let mut ws = HeadlessWindowSystem::new();
        let desc = ws.add_window(Extent::new(640, 480));
        let surface = ws.create_surface(&desc).unwrap();

        assert_eq!(ws.poll_resize(surface), None);
        ws.resize_window(desc.window, Extent::new(800, 600));
        assert_eq!(ws.poll_resize(surface), Some(Extent::new(800, 600)));
        assert_eq!(ws.poll_resize(surface), None);
        assert_eq!(ws.surface_extent(surface), Some(Extent::new(800, 600)));
    }

    #[test]
    fn unknown_window_is_recoverable() {
        let mut ws = HeadlessWindowSystem::new();
        let err = ws
            .create_surface(&WindowDescriptor::new(WindowKey(99)))
            .unwrap_err();
        assert!(!err.is_critical());
    }
}
