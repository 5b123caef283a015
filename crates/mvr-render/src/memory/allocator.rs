use std::collections::HashMap;

use crate::backend::{DataBufferId, DeviceId, GraphicsRuntime};
use crate::device::DeviceContext;
use crate::error::{ErrorDomain, RenderError, RenderResult};
use crate::handle::{DataBuffer, HandleKind, HandleRegistry};

use super::pages::{PageAllocator, DEFAULT_PAGE_SIZE};

/// Frames whose temporary data may still be read by the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Where a data buffer lives inside the runtime's GPU buffers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DataRegion {
    pub buffer: DataBufferId,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Lifetime {
    Frame,
    Permanent,
}

#[derive(Debug)]
struct Entry {
    region: DataRegion,
    lifetime: Lifetime,
}

/// Temporary and permanent data buffers of one session.
///
/// Temporary buffers are suballocated from the pages of the current frame and
/// stop being valid at [`end_frame`](Self::end_frame). A frame's pages are
/// rewound when it comes around again, `FRAMES_IN_FLIGHT` presents later.
/// Permanent buffers own a runtime buffer each and live until destroyed.
///
/// The device is retained from the first allocation until teardown.
#[derive(Debug)]
pub struct DataAllocator {
    frames: Vec<PageAllocator>,
    frame: usize,
    alignment: Option<u64>,
    entries: HashMap<DataBuffer, Entry>,
    retained: bool,
}

impl DataAllocator {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: u64) -> Self {
        Self {
            frames: (0..FRAMES_IN_FLIGHT)
                .map(|_| PageAllocator::new(page_size))
                .collect(),
            frame: 0,
            alignment: None,
            entries: HashMap::new(),
            retained: false,
        }
    }

    /// Reserves `size` bytes valid until the next [`end_frame`](Self::end_frame).
    pub fn allocate_temp<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        device: &mut DeviceContext,
        size: u64,
    ) -> RenderResult<DataBuffer> {
        let (device_id, alignment) = self.prepare(runtime, device, size)?;
        let region = self.frames[self.frame]
            .allocate(runtime, device_id, size, alignment)
            .map_err(|e| RenderError::from_backend(ErrorDomain::Graphics, e))?;
        Ok(self.issue(registry, region, Lifetime::Frame))
    }

    /// Reserves a temporary buffer and fills it with `data`.
    pub fn create_temp<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        device: &mut DeviceContext,
        data: &[u8],
    ) -> RenderResult<DataBuffer> {
        let buffer = self.allocate_temp(runtime, registry, device, data.len() as u64)?;
        // On failure the range is reclaimed with the rest of the frame.
        self.write(runtime, device, buffer, 0, data)?;
        Ok(buffer)
    }

    /// Creates a buffer of `size` bytes that lives until [`destroy`](Self::destroy).
    pub fn allocate_permanent<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        device: &mut DeviceContext,
        size: u64,
    ) -> RenderResult<DataBuffer> {
        let (device_id, _) = self.prepare(runtime, device, size)?;
        let raw = runtime
            .create_data_buffer(device_id, size)
            .map_err(|e| RenderError::from_backend(ErrorDomain::Graphics, e))?;
        let region = DataRegion {
            buffer: raw,
            offset: 0,
            size,
        };
        Ok(self.issue(registry, region, Lifetime::Permanent))
    }

    /// Creates a permanent buffer holding `data`.
    pub fn create_permanent<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        device: &mut DeviceContext,
        data: &[u8],
    ) -> RenderResult<DataBuffer> {
        let buffer = self.allocate_permanent(runtime, registry, device, data.len() as u64)?;
        if let Err(err) = self.write(runtime, device, buffer, 0, data) {
            if let Err(cleanup) = self.destroy(runtime, registry, device, buffer) {
                log::warn!("data buffer rollback: {cleanup}");
            }
            return Err(err);
        }
        Ok(buffer)
    }

    /// Copies `data` into a live buffer at `offset`.
    ///
    /// `Failure` for a dead handle or a write past the end of the buffer.
    pub fn write<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        device: &DeviceContext,
        buffer: DataBuffer,
        offset: u64,
        data: &[u8],
    ) -> RenderResult {
        let region = self
            .entries
            .get(&buffer)
            .map(|e| e.region)
            .ok_or_else(|| RenderError::failure(format!("{buffer:?} is not a live data buffer")))?;
        offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= region.size)
            .ok_or_else(|| {
                RenderError::failure(format!(
                    "write of {} byte(s) at {offset} overruns the {} byte {buffer:?}",
                    data.len(),
                    region.size
                ))
            })?;
        if data.is_empty() {
            return Ok(());
        }

        runtime
            .write_data_buffer(device.raw()?, region.buffer, region.offset + offset, data)
            .map_err(|e| RenderError::from_backend(ErrorDomain::Graphics, e))
    }

    /// Destroys a permanent buffer.
    ///
    /// `Failure` for a temporary buffer, which is recycled at the next present,
    /// and for a handle that is not live.
    pub fn destroy<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        device: &DeviceContext,
        buffer: DataBuffer,
    ) -> RenderResult {
        match self.entries.get(&buffer).map(|e| e.lifetime) {
            None => Err(RenderError::failure(format!(
                "{buffer:?} is not a live data buffer"
            ))),
            Some(Lifetime::Frame) => Err(RenderError::failure(format!(
                "{buffer:?} is temporary and is recycled at the next present"
            ))),
            Some(Lifetime::Permanent) => {
                let device_id = device.raw()?;
                if let Some(entry) = self.entries.remove(&buffer) {
                    runtime.destroy_data_buffer(device_id, entry.region.buffer);
                }
                registry.release(buffer.handle())
            }
        }
    }

    /// Location of a live buffer; `None` once it was destroyed or recycled.
    pub fn region(&self, buffer: DataBuffer) -> Option<DataRegion> {
        self.entries.get(&buffer).map(|e| e.region)
    }

    /// Invalidates every temporary buffer and moves on to the next frame's pages.
    pub fn end_frame(&mut self, registry: &mut HandleRegistry) {
        self.entries.retain(|buffer, entry| {
            if entry.lifetime == Lifetime::Permanent {
                return true;
            }
            if let Err(err) = registry.release(buffer.handle()) {
                log::warn!("temporary data buffer: {err}");
            }
            false
        });
        self.frame = (self.frame + 1) % FRAMES_IN_FLIGHT;
        self.frames[self.frame].rewind();
    }

    /// Destroys every buffer and page and lets go of the device.
    pub fn teardown<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        registry: &mut HandleRegistry,
        device: &mut DeviceContext,
    ) -> RenderResult {
        if !self.retained {
            return Ok(());
        }
        let device_id = device.raw()?;

        let mut result = Ok(());
        for (buffer, entry) in self.entries.drain() {
            if entry.lifetime == Lifetime::Permanent {
                runtime.destroy_data_buffer(device_id, entry.region.buffer);
            }
            if let Err(err) = registry.release(buffer.handle()) {
                result = Err(err);
            }
        }
        for frame in &mut self.frames {
            frame.release(runtime, device_id);
        }

        device.release_dependent();
        self.retained = false;
        self.alignment = None;
        self.frame = 0;
        result
    }

    pub fn temp_count(&self) -> usize {
        self.count(Lifetime::Frame)
    }

    pub fn permanent_count(&self) -> usize {
        self.count(Lifetime::Permanent)
    }

    pub fn page_count(&self) -> usize {
        self.frames.iter().map(PageAllocator::page_count).sum()
    }

    fn count(&self, lifetime: Lifetime) -> usize {
        self.entries.values().filter(|e| e.lifetime == lifetime).count()
    }

    /// Validates the request and makes sure the device is retained and the
    /// alignment known.
    fn prepare<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        device: &mut DeviceContext,
        size: u64,
    ) -> RenderResult<(DeviceId, u64)> {
        if size == 0 {
            return Err(RenderError::failure("data buffers cannot be empty"));
        }
        let device_id = device.raw()?;

        let alignment = match self.alignment {
            Some(alignment) => alignment,
            None => {
                let alignment = runtime
                    .data_alignment(device_id)
                    .map_err(|e| RenderError::from_backend(ErrorDomain::Graphics, e))?;
                self.alignment = Some(alignment);
                alignment
            }
        };
        if !self.retained {
            device.retain();
            self.retained = true;
        }
        Ok((device_id, alignment))
    }

    fn issue(
        &mut self,
        registry: &mut HandleRegistry,
        region: DataRegion,
        lifetime: Lifetime,
    ) -> DataBuffer {
        let buffer = DataBuffer::from_handle(registry.allocate(HandleKind::Data));
        self.entries.insert(buffer, Entry { region, lifetime });
        buffer
    }
}

impl Default for DataAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessConfig, HeadlessRuntime};
    use crate::backend::{BackendError, RuntimeOptions};
    use crate::device::DevicePreferences;

    struct Fixture {
        rt: HeadlessRuntime,
        reg: HandleRegistry,
        device: DeviceContext,
        data: DataAllocator,
    }

    impl Fixture {
        fn temp(&mut self, bytes: &[u8]) -> RenderResult<DataBuffer> {
            self.data
                .create_temp(&mut self.rt, &mut self.reg, &mut self.device, bytes)
        }

        fn permanent(&mut self, bytes: &[u8]) -> RenderResult<DataBuffer> {
            self.data
                .create_permanent(&mut self.rt, &mut self.reg, &mut self.device, bytes)
        }

        fn contents(&self, buffer: DataBuffer) -> Vec<u8> {
            let region = self.data.region(buffer).unwrap();
            let start = region.offset as usize;
            self.rt.data_contents(region.buffer).unwrap()[start..start + region.size as usize]
                .to_vec()
        }

        fn teardown(&mut self) -> RenderResult {
            self.data
                .teardown(&mut self.rt, &mut self.reg, &mut self.device)
        }
    }

    fn fixture(page_size: u64) -> Fixture {
        let mut rt = HeadlessRuntime::new(HeadlessConfig::default());
        let mut reg = HandleRegistry::new();
        let mut device = DeviceContext::new();
        device
            .initialize(
                &mut rt,
                &mut reg,
                &RuntimeOptions::default(),
                &DevicePreferences::default(),
            )
            .unwrap();
        Fixture {
            rt,
            reg,
            device,
            data: DataAllocator::with_page_size(page_size),
        }
    }

    #[test]
    fn temp_data_is_written_and_aligned() {
        let mut f = fixture(4096);
        let a = f.temp(&[1, 2, 3]).unwrap();
        let b = f.temp(&[4, 5]).unwrap();

        assert_eq!(f.contents(a), vec![1, 2, 3]);
        assert_eq!(f.contents(b), vec![4, 5]);
        let (ra, rb) = (f.data.region(a).unwrap(), f.data.region(b).unwrap());
        assert_eq!(ra.buffer, rb.buffer);
        assert_eq!(rb.offset % 256, 0);
        assert!(f.reg.is_valid_kind(a.handle(), HandleKind::Data));
    }

    #[test]
    fn temp_buffers_expire_at_end_of_frame() {
        let mut f = fixture(4096);
        let old = f.temp(&[7; 16]).unwrap();
        f.data.end_frame(&mut f.reg);

        assert!(!f.reg.is_valid(old.handle()));
        assert_eq!(f.data.region(old), None);
        assert_eq!(f.data.temp_count(), 0);
        assert!(matches!(
            f.data.write(&mut f.rt, &f.device, old, 0, &[1]),
            Err(RenderError::Failure(_))
        ));
    }

    #[test]
    fn frame_pages_are_reused_two_frames_later() {
        let mut f = fixture(4096);
        let h1 = f.temp(&[1; 8]).unwrap();
        let first = f.data.region(h1).unwrap();
        f.data.end_frame(&mut f.reg);

        // The previous frame's page may still be read by the GPU.
        let h2 = f.temp(&[2; 8]).unwrap();
        let second = f.data.region(h2).unwrap();
        assert_ne!(first.buffer, second.buffer);
        f.data.end_frame(&mut f.reg);

        let h3 = f.temp(&[3; 8]).unwrap();
        let third = f.data.region(h3).unwrap();
        assert_eq!(third, first);
        assert_eq!(f.data.page_count(), FRAMES_IN_FLIGHT);
    }

    #[test]
    fn permanent_buffers_survive_frames_until_destroyed() {
        let mut f = fixture(4096);
        let keep = f.permanent(&[9, 8, 7, 6]).unwrap();
        f.data.end_frame(&mut f.reg);
        f.data.end_frame(&mut f.reg);

        assert_eq!(f.contents(keep), vec![9, 8, 7, 6]);
        f.data
            .write(&mut f.rt, &f.device, keep, 2, &[1, 1])
            .unwrap();
        assert_eq!(f.contents(keep), vec![9, 8, 1, 1]);

        f.data.destroy(&mut f.rt, &mut f.reg, &f.device, keep).unwrap();
        assert!(!f.reg.is_valid(keep.handle()));
        assert_eq!(f.rt.live_data_buffers(), 0);
        assert!(matches!(
            f.data.destroy(&mut f.rt, &mut f.reg, &f.device, keep),
            Err(RenderError::Failure(_))
        ));
    }

    #[test]
    fn temp_buffers_cannot_be_destroyed() {
        let mut f = fixture(4096);
        let temp = f.temp(&[1]).unwrap();
        assert!(matches!(
            f.data.destroy(&mut f.rt, &mut f.reg, &f.device, temp),
            Err(RenderError::Failure(_))
        ));
        assert!(f.reg.is_valid(temp.handle()));
    }

    #[test]
    fn out_of_bounds_write_is_failure() {
        let mut f = fixture(4096);
        let buffer = f.permanent(&[0; 4]).unwrap();
        assert!(matches!(
            f.data.write(&mut f.rt, &f.device, buffer, 3, &[1, 2]),
            Err(RenderError::Failure(_))
        ));
        assert!(matches!(
            f.data.write(&mut f.rt, &f.device, buffer, u64::MAX, &[1]),
            Err(RenderError::Failure(_))
        ));
        assert_eq!(f.contents(buffer), vec![0; 4]);
    }

    #[test]
    fn empty_request_is_failure() {
        let mut f = fixture(4096);
        assert!(matches!(f.temp(&[]), Err(RenderError::Failure(_))));
        assert!(matches!(f.permanent(&[]), Err(RenderError::Failure(_))));
        assert_eq!(f.reg.live_count_of(HandleKind::Data), 0);
    }

    #[test]
    fn runtime_failure_keeps_severity_and_issues_nothing() {
        let mut f = fixture(4096);
        f.rt.fail_data_buffer = Some(BackendError::Recoverable("out of video memory".into()));
        assert!(matches!(f.permanent(&[1; 4]), Err(RenderError::Graphics(_))));
        assert_eq!(f.reg.live_count_of(HandleKind::Data), 0);
    }

    #[test]
    fn device_is_held_until_teardown() {
        let mut f = fixture(4096);
        f.temp(&[1; 4]).unwrap();
        f.permanent(&[2; 4]).unwrap();
        assert_eq!(f.device.dependents(), 1);
        assert!(f.device.shutdown(&mut f.rt, &mut f.reg).is_err());

        f.teardown().unwrap();
        assert_eq!(f.device.dependents(), 0);
        assert_eq!(f.rt.live_data_buffers(), 0);
        assert_eq!(f.reg.live_count_of(HandleKind::Data), 0);
        f.device.shutdown(&mut f.rt, &mut f.reg).unwrap();
        assert_eq!(f.reg.live_count(), 0);
    }

    #[test]
    fn teardown_without_allocations_is_noop() {
        let mut f = fixture(4096);
        f.teardown().unwrap();
        assert_eq!(f.device.dependents(), 0);
    }
}
