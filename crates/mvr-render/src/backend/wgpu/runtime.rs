use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;

use crate::backend::{
    ApiVersion, BackendError, BufferId, DataBufferId, DeviceDescriptor, DeviceId, DeviceType,
    GraphicsRuntime, PresentStatus, RuntimeOptions, SurfaceCapabilities, SurfaceConfig,
    SurfaceId,
};
use crate::present::PresentMode;

use super::shared::{lock, SharedHandle};

/// wgpu configuration knobs.
#[derive(Debug, Clone)]
pub struct GpuInit {
    pub backends: wgpu::Backends,
    pub prefer_srgb: bool,
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,
    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            prefer_srgb: true,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

struct DeviceEntry {
    adapter: usize,
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
}

struct BufferEntry {
    device: DeviceId,
    surface: SurfaceId,
    texture: wgpu::Texture,
    idle: Arc<AtomicBool>,
}

struct DataEntry {
    device: DeviceId,
    buffer: wgpu::Buffer,
}

/// Graphics runtime backed by wgpu.
///
/// Data buffers are plain `wgpu::Buffer`s usable as vertex, index, uniform or
/// storage data; [`data_buffer`](Self::data_buffer) exposes them for binding.
pub struct WgpuRuntime {
    shared: SharedHandle,
    init: GpuInit,
    adapters: Vec<wgpu::Adapter>,
    devices: HashMap<DeviceId, DeviceEntry>,
    buffers: HashMap<BufferId, BufferEntry>,
    data: HashMap<DataBufferId, DataEntry>,
    next_id: u64,
}

impl WgpuRuntime {
    pub(super) fn new(shared: SharedHandle, init: GpuInit) -> Self {
        Self {
            shared,
            init,
            adapters: Vec::new(),
            devices: HashMap::new(),
            buffers: HashMap::new(),
            data: HashMap::new(),
            next_id: 0,
        }
    }

    /// The wgpu buffer behind a data buffer id.
    pub fn data_buffer(&self, buffer: DataBufferId) -> Option<&wgpu::Buffer> {
        self.data.get(&buffer).map(|d| &d.buffer)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_device(&self, device: DeviceId) -> Result<&DeviceEntry, BackendError> {
        let entry = self
            .devices
            .get(&device)
            .ok_or_else(|| BackendError::Recoverable(format!("unknown device {device:?}")))?;
        if entry.lost.load(Ordering::Acquire) {
            return Err(BackendError::Critical("device lost".into()));
        }
        Ok(entry)
    }

    fn adapter(&self, entry: &DeviceEntry) -> Result<&wgpu::Adapter, BackendError> {
        self.adapters
            .get(entry.adapter)
            .ok_or_else(|| BackendError::Critical("adapter no longer enumerated".into()))
    }
}

impl GraphicsRuntime for WgpuRuntime {
    fn initialize(&mut self, options: &RuntimeOptions) -> Result<(), BackendError> {
        let flags = if options.debug {
            wgpu::InstanceFlags::debugging()
        } else {
            wgpu::InstanceFlags::default()
        };
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: self.init.backends,
            flags,
            ..Default::default()
        });

        log::info!(
            "wgpu instance created for '{}' (backends: {:?}, debug: {})",
            options.application_name,
            self.init.backends,
            options.debug
        );
        lock(&self.shared)?.instance = Some(instance);
        Ok(())
    }

    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>, BackendError> {
        let shared = lock(&self.shared)?;
        let instance = shared
            .instance
            .as_ref()
            .ok_or_else(|| BackendError::Critical("wgpu instance is not initialized".into()))?;

        self.adapters = pollster::block_on(instance.enumerate_adapters(self.init.backends));

        // The real surface is created after the device; a throwaway one for a
        // registered window tells which adapters can present at all.
        let sample_surface = match shared.windows.values().next() {
            Some(window) => match instance.create_surface(window.clone()) {
                Ok(surface) => Some(surface),
                Err(e) => {
                    log::warn!("cannot check presentation support: {e}");
                    None
                }
            },
            None => {
                log::warn!("no window registered; no adapter can be checked for presentation");
                None
            }
        };

        Ok(self
            .adapters
            .iter()
            .enumerate()
            .map(|(index, adapter)| {
                let presents = sample_surface
                    .as_ref()
                    .is_some_and(|surface| adapter.is_surface_supported(surface));
                describe_adapter(index as u32, &adapter.get_info(), presents)
            })
            .collect())
    }

    fn create_device(&mut self, descriptor: &DeviceDescriptor) -> Result<DeviceId, BackendError> {
        let adapter_index = descriptor.index as usize;
        let adapter = self.adapters.get(adapter_index).ok_or_else(|| {
            BackendError::Recoverable(format!("no adapter at index {}", descriptor.index))
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("mvr device"),
            required_features: self.init.required_features,
            required_limits: self.init.required_limits.clone(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .with_context(|| format!("failed to create wgpu device on '{}'", descriptor.name))
        .map_err(|e| BackendError::Recoverable(format!("{e:#}")))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::error!("wgpu device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });

        let id = DeviceId(self.next_id());
        self.devices.insert(
            id,
            DeviceEntry {
                adapter: adapter_index,
                device,
                queue,
                lost,
            },
        );
        Ok(id)
    }

    fn surface_capabilities(
        &mut self,
        device: DeviceId,
        surface: SurfaceId,
    ) -> Result<SurfaceCapabilities, BackendError> {
        let entry = self.live_device(device)?;
        let adapter = self.adapter(entry)?;
        let shared = lock(&self.shared)?;
        let target = shared
            .surfaces
            .get(&surface)
            .ok_or_else(|| BackendError::Recoverable(format!("unknown surface {surface:?}")))?;

        let caps = target.surface.get_capabilities(adapter);
        let mut present_modes = Vec::new();
        if !caps.formats.is_empty() && caps.usages.contains(wgpu::TextureUsages::COPY_DST) {
            for mode in caps.present_modes.iter().filter_map(|m| from_wgpu_present_mode(*m)) {
                if !present_modes.contains(&mode) {
                    present_modes.push(mode);
                }
            }
        }

        // wgpu derives the swapchain length from the frame latency itself.
        Ok(SurfaceCapabilities {
            present_modes,
            min_buffer_count: 1,
            max_buffer_count: None,
        })
    }

    fn configure_surface(
        &mut self,
        device: DeviceId,
        surface: SurfaceId,
        config: &SurfaceConfig,
    ) -> Result<(), BackendError> {
        let entry = self.live_device(device)?;
        let adapter = self.adapter(entry)?;
        let mut shared = lock(&self.shared)?;
        let target = shared
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| BackendError::Recoverable(format!("unknown surface {surface:?}")))?;

        if config.extent.is_empty() {
            return Err(BackendError::Recoverable("surface has zero size".into()));
        }

        let caps = target.surface.get_capabilities(adapter);
        let format = choose_surface_format(&caps, self.init.prefer_srgb)
            .ok_or_else(|| BackendError::Recoverable("surface reports no formats".into()))?;
        let alpha_mode = choose_alpha_mode(&caps, self.init.alpha_mode);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format,
            width: config.extent.width,
            height: config.extent.height,
            present_mode: to_wgpu_present_mode(config.present_mode),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: config.buffer_count.saturating_sub(1).clamp(1, 3),
        };
        target.surface.configure(&entry.device, &surface_config);

        log::debug!(
            "configured {surface:?}: {}x{} {format:?} {:?}",
            surface_config.width,
            surface_config.height,
            surface_config.present_mode
        );
        target.config = Some(surface_config);
        Ok(())
    }

    fn create_presentable_buffer(
        &mut self,
        device: DeviceId,
        surface: SurfaceId,
    ) -> Result<BufferId, BackendError> {
        let id = BufferId(self.next_id());
        let entry = self.live_device(device)?;
        let shared = lock(&self.shared)?;
        let config = shared
            .surfaces
            .get(&surface)
            .and_then(|s| s.config.as_ref())
            .ok_or_else(|| BackendError::Recoverable("surface is not configured".into()))?;

        let texture = entry.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("mvr presentable buffer"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: config.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        drop(shared);

        self.buffers.insert(
            id,
            BufferEntry {
                device,
                surface,
                texture,
                idle: Arc::new(AtomicBool::new(true)),
            },
        );
        Ok(id)
    }

    fn submit_present(
        &mut self,
        device: DeviceId,
        buffer: BufferId,
    ) -> Result<PresentStatus, BackendError> {
        let entry = self
            .devices
            .get(&device)
            .ok_or_else(|| BackendError::Recoverable(format!("unknown device {device:?}")))?;
        if entry.lost.load(Ordering::Acquire) {
            return Ok(PresentStatus::DeviceLost);
        }
        let source = self
            .buffers
            .get(&buffer)
            .filter(|b| b.device == device)
            .ok_or_else(|| BackendError::Recoverable(format!("unknown buffer {buffer:?}")))?;

        let shared = lock(&self.shared)?;
        let target = shared
            .surfaces
            .get(&source.surface)
            .ok_or_else(|| BackendError::Recoverable("buffer's surface is gone".into()))?;

        let frame = match target.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                return Ok(PresentStatus::Outdated);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(BackendError::Critical("surface out of memory".into()));
            }
            Err(err) => {
                return Err(BackendError::Recoverable(format!(
                    "failed to acquire surface texture: {err}"
                )));
            }
        };
        if frame.suboptimal || frame.texture.size() != source.texture.size() {
            return Ok(PresentStatus::Outdated);
        }

        let mut encoder = entry
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mvr present copy"),
            });
        encoder.copy_texture_to_texture(
            source.texture.as_image_copy(),
            frame.texture.as_image_copy(),
            source.texture.size(),
        );

        source.idle.store(false, Ordering::Release);
        entry.queue.submit(std::iter::once(encoder.finish()));
        let idle = source.idle.clone();
        entry
            .queue
            .on_submitted_work_done(move || idle.store(true, Ordering::Release));
        frame.present();

        Ok(PresentStatus::Presented)
    }

    fn is_buffer_idle(&mut self, device: DeviceId, buffer: BufferId) -> bool {
        let (Some(entry), Some(source)) = (self.devices.get(&device), self.buffers.get(&buffer))
        else {
            return true;
        };
        idle_after_poll(
            entry.device.poll(wgpu::PollType::Poll),
            entry.lost.load(Ordering::Acquire),
            source.idle.load(Ordering::Acquire),
        )
    }

    fn wait_buffer_idle(&mut self, device: DeviceId, buffer: BufferId) -> Result<(), BackendError> {
        let entry = self.live_device(device)?;
        let Some(source) = self.buffers.get(&buffer) else {
            return Ok(());
        };
        if source.idle.load(Ordering::Acquire) {
            return Ok(());
        }

        entry
            .device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BackendError::Recoverable(format!("failed to wait for the GPU: {e}")))?;
        if entry.lost.load(Ordering::Acquire) {
            return Err(BackendError::Critical("device lost while waiting for a buffer".into()));
        }
        // The queue is drained.
        source.idle.store(true, Ordering::Release);
        Ok(())
    }

    fn destroy_buffer(&mut self, _device: DeviceId, buffer: BufferId) {
        if let Some(entry) = self.buffers.remove(&buffer) {
            entry.texture.destroy();
        }
    }

    fn data_alignment(&mut self, device: DeviceId) -> Result<u64, BackendError> {
        let limits = self.live_device(device)?.device.limits();
        let alignment = limits
            .min_uniform_buffer_offset_alignment
            .max(limits.min_storage_buffer_offset_alignment);
        Ok(u64::from(alignment).max(wgpu::COPY_BUFFER_ALIGNMENT))
    }

    fn create_data_buffer(
        &mut self,
        device: DeviceId,
        size: u64,
    ) -> Result<DataBufferId, BackendError> {
        let id = DataBufferId(self.next_id());
        let entry = self.live_device(device)?;
        let size = size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let max = entry.device.limits().max_buffer_size;
        if size > max {
            return Err(BackendError::Recoverable(format!(
                "{size} byte data buffer exceeds the device limit of {max}"
            )));
        }

        let buffer = entry.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mvr data buffer"),
            size,
            usage: wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::INDEX
                | wgpu::BufferUsages::UNIFORM
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.data.insert(id, DataEntry { device, buffer });
        Ok(id)
    }

    /// wgpu copies whole words: `offset` must be a multiple of four and a
    /// trailing partial word is zero-filled.
    fn write_data_buffer(
        &mut self,
        device: DeviceId,
        buffer: DataBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let entry = self.live_device(device)?;
        let target = self
            .data
            .get(&buffer)
            .filter(|d| d.device == device)
            .ok_or_else(|| BackendError::Recoverable(format!("unknown data buffer {buffer:?}")))?;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(BackendError::Recoverable(format!(
                "data write offset {offset} is not {} byte aligned",
                wgpu::COPY_BUFFER_ALIGNMENT
            )));
        }

        let padded_len = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if offset.saturating_add(padded_len) > target.buffer.size() {
            return Err(BackendError::Recoverable(format!(
                "write of {} byte(s) at {offset} overruns {buffer:?}",
                data.len()
            )));
        }
        if padded_len == data.len() as u64 {
            entry.queue.write_buffer(&target.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(padded_len as usize, 0);
            entry.queue.write_buffer(&target.buffer, offset, &padded);
        }
        Ok(())
    }

    fn destroy_data_buffer(&mut self, _device: DeviceId, buffer: DataBufferId) {
        if let Some(entry) = self.data.remove(&buffer) {
            entry.buffer.destroy();
        }
    }

    fn destroy_device(&mut self, device: DeviceId) {
        self.buffers.retain(|_, b| {
            if b.device == device {
                b.texture.destroy();
                false
            } else {
                true
            }
        });
        self.data.retain(|_, d| {
            if d.device == device {
                d.buffer.destroy();
                false
            } else {
                true
            }
        });
        if let Some(entry) = self.devices.remove(&device) {
            entry.device.destroy();
        }
    }

    fn shutdown(&mut self) {
        for (_, buffer) in self.buffers.drain() {
            buffer.texture.destroy();
        }
        for (_, entry) in self.data.drain() {
            entry.buffer.destroy();
        }
        for (_, entry) in self.devices.drain() {
            entry.device.destroy();
        }
        self.adapters.clear();
        if let Ok(mut shared) = lock(&self.shared) {
            shared.instance = None;
        }
    }
}

/// A failed poll or a lost device reads as busy; the wait that follows
/// reports the error.
fn idle_after_poll(
    poll: Result<wgpu::PollStatus, wgpu::PollError>,
    lost: bool,
    idle: bool,
) -> bool {
    if let Err(e) = poll {
        log::warn!("device poll failed: {e}");
        return false;
    }
    !lost && idle
}

fn describe_adapter(
    index: u32,
    info: &wgpu::AdapterInfo,
    supports_present: bool,
) -> DeviceDescriptor {
    let device_type = match info.device_type {
        wgpu::DeviceType::DiscreteGpu => DeviceType::DiscreteGpu,
        wgpu::DeviceType::IntegratedGpu => DeviceType::IntegratedGpu,
        wgpu::DeviceType::VirtualGpu => DeviceType::VirtualGpu,
        wgpu::DeviceType::Cpu => DeviceType::Cpu,
        wgpu::DeviceType::Other => DeviceType::Other,
    };
    DeviceDescriptor {
        index,
        name: format!("{} ({:?})", info.name, info.backend),
        device_type,
        // wgpu does not expose the driver API version.
        api_version: ApiVersion::default(),
        supports_present,
    }
}

fn to_wgpu_present_mode(mode: PresentMode) -> wgpu::PresentMode {
    match mode {
        PresentMode::Vsync => wgpu::PresentMode::Fifo,
        PresentMode::TripleBuffer => wgpu::PresentMode::Mailbox,
        PresentMode::Immediate => wgpu::PresentMode::Immediate,
    }
}

fn from_wgpu_present_mode(mode: wgpu::PresentMode) -> Option<PresentMode> {
    match mode {
        wgpu::PresentMode::Fifo | wgpu::PresentMode::FifoRelaxed => Some(PresentMode::Vsync),
        wgpu::PresentMode::Mailbox => Some(PresentMode::TripleBuffer),
        wgpu::PresentMode::Immediate => Some(PresentMode::Immediate),
        _ => None,
    }
}

fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if prefer_srgb {
        let srgb = caps.formats.iter().copied().find(|f| f.is_srgb());
        if srgb.is_some() {
            return srgb;
        }
    }
    caps.formats.first().copied()
}

fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_modes_map_both_ways() {
        for mode in PresentMode::ALL {
            assert_eq!(from_wgpu_present_mode(to_wgpu_present_mode(mode)), Some(mode));
        }
        assert_eq!(from_wgpu_present_mode(wgpu::PresentMode::FifoRelaxed), Some(PresentMode::Vsync));
        assert_eq!(from_wgpu_present_mode(wgpu::PresentMode::AutoVsync), None);
    }

    fn adapter_info(device_type: wgpu::DeviceType) -> wgpu::AdapterInfo {
        wgpu::AdapterInfo {
            name: "llvmpipe".to_string(),
            vendor: 0x10005,
            device: 0,
            device_type,
            device_pci_bus_id: String::new(),
            driver: String::new(),
            driver_info: String::new(),
            backend: wgpu::Backend::Vulkan,
            subgroup_min_size: 4,
            subgroup_max_size: 128,
            transient_saves_memory: false,
        }
    }

    #[test]
    fn poll_failure_or_loss_reads_as_busy() {
        assert!(idle_after_poll(Ok(wgpu::PollStatus::QueueEmpty), false, true));
        assert!(!idle_after_poll(Ok(wgpu::PollStatus::Poll), false, false));
        assert!(!idle_after_poll(Ok(wgpu::PollStatus::QueueEmpty), true, true));
        assert!(!idle_after_poll(Err(wgpu::PollError::Timeout), false, true));
    }

    #[test]
    fn adapter_description_keeps_type_and_presentation() {
        let cpu = describe_adapter(2, &adapter_info(wgpu::DeviceType::Cpu), false);
        assert_eq!(cpu.index, 2);
        assert_eq!(cpu.device_type, DeviceType::Cpu);
        assert!(!cpu.supports_present);
        assert!(cpu.name.contains("llvmpipe"));

        let virtual_gpu = describe_adapter(0, &adapter_info(wgpu::DeviceType::VirtualGpu), true);
        assert_eq!(virtual_gpu.device_type, DeviceType::VirtualGpu);
        assert!(virtual_gpu.supports_present);
    }

    #[test]
    fn srgb_format_preferred_when_available() {
        let caps = wgpu::SurfaceCapabilities {
            formats: vec![
                wgpu::TextureFormat::Bgra8Unorm,
                wgpu::TextureFormat::Bgra8UnormSrgb,
            ],
            ..Default::default()
        };
        assert_eq!(
            choose_surface_format(&caps, true),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(
            choose_surface_format(&caps, false),
            Some(wgpu::TextureFormat::Bgra8Unorm)
        );
        assert_eq!(choose_surface_format(&wgpu::SurfaceCapabilities::default(), true), None);
    }

    #[test]
    fn unsupported_alpha_mode_falls_back_to_first() {
        let caps = wgpu::SurfaceCapabilities {
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            ..Default::default()
        };
        assert_eq!(
            choose_alpha_mode(&caps, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
    }
}
