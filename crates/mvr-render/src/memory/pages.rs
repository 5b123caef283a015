use crate::backend::{BackendError, DataBufferId, DeviceId, GraphicsRuntime};

use super::allocator::DataRegion;

/// Size of a freshly appended page.
pub const DEFAULT_PAGE_SIZE: u64 = 256 * 1024;

/// Rounds `value` up to the next multiple of `alignment`.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment).saturating_mul(alignment)
}

#[derive(Debug)]
struct Page {
    buffer: DataBufferId,
    size: u64,
    /// Next free byte; always aligned.
    offset: u64,
}

/// Bump allocator over a growing list of runtime data buffers.
///
/// Ranges are never freed one by one: [`rewind`](Self::rewind) recycles every
/// page at once.
#[derive(Debug)]
pub(crate) struct PageAllocator {
    pages: Vec<Page>,
    page_size: u64,
}

impl PageAllocator {
    pub fn new(page_size: u64) -> Self {
        Self {
            pages: Vec::new(),
            page_size: page_size.max(1),
        }
    }

    /// Carves `size` bytes out of the first page with room, appending a page
    /// when none has any.
    pub fn allocate<G: GraphicsRuntime>(
        &mut self,
        runtime: &mut G,
        device: DeviceId,
        size: u64,
        alignment: u64,
    ) -> Result<DataRegion, BackendError> {
        let index = match self.pages.iter().position(|p| p.size - p.offset >= size) {
            Some(index) => index,
            None => {
                // Oversized requests get the usual headroom on top.
                let page_size = if size > self.page_size {
                    self.page_size.saturating_add(size)
                } else {
                    self.page_size
                };
                let buffer = runtime.create_data_buffer(device, page_size)?;
                log::debug!("appended {page_size} byte data page {buffer:?}");
                self.pages.push(Page {
                    buffer,
                    size: page_size,
                    offset: 0,
                });
                self.pages.len() - 1
            }
        };

        let page = &mut self.pages[index];
        let region = DataRegion {
            buffer: page.buffer,
            offset: page.offset,
            size,
        };
        page.offset = align_up(page.offset + size, alignment).min(page.size);
        Ok(region)
    }

    /// Makes every page empty again. Pages stay allocated.
    pub fn rewind(&mut self) {
        for page in &mut self.pages {
            page.offset = 0;
        }
    }

    /// Destroys every page.
    pub fn release<G: GraphicsRuntime>(&mut self, runtime: &mut G, device: DeviceId) {
        for page in self.pages.drain(..) {
            runtime.destroy_data_buffer(device, page.buffer);
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Bytes handed out since the last rewind, alignment padding included.
    pub fn used(&self) -> u64 {
        self.pages.iter().map(|p| p.offset).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessConfig, HeadlessRuntime};
    use crate::backend::RuntimeOptions;

    fn runtime_with_device() -> (HeadlessRuntime, DeviceId) {
        let mut rt = HeadlessRuntime::new(HeadlessConfig::default());
        rt.initialize(&RuntimeOptions::default()).unwrap();
        let devices = rt.enumerate_devices().unwrap();
        let device = rt.create_device(&devices[0]).unwrap();
        (rt, device)
    }

    #[test]
    fn align_up_rounds_to_multiples() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(13, 1), 13);
        assert_eq!(align_up(13, 0), 13);
    }

    #[test]
    fn ranges_are_aligned_and_disjoint() {
        let (mut rt, device) = runtime_with_device();
        let mut pages = PageAllocator::new(1024);

        let a = pages.allocate(&mut rt, device, 100, 64).unwrap();
        let b = pages.allocate(&mut rt, device, 10, 64).unwrap();
        assert_eq!(a.buffer, b.buffer);
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 128);
        assert_eq!(pages.used(), 192);
        assert_eq!(pages.page_count(), 1);
    }

    #[test]
    fn full_page_appends_another() {
        let (mut rt, device) = runtime_with_device();
        let mut pages = PageAllocator::new(512);

        let a = pages.allocate(&mut rt, device, 200, 64).unwrap();
        let b = pages.allocate(&mut rt, device, 300, 64).unwrap();
        assert_ne!(a.buffer, b.buffer);
        assert_eq!(b.offset, 0);

        // Small enough for the tail of the first page.
        let c = pages.allocate(&mut rt, device, 30, 64).unwrap();
        assert_eq!(c.buffer, a.buffer);
        assert_eq!(c.offset, 256);
        assert_eq!(pages.page_count(), 2);
    }

    #[test]
    fn oversized_request_gets_its_own_page() {
        let (mut rt, device) = runtime_with_device();
        let mut pages = PageAllocator::new(256);

        let big = pages.allocate(&mut rt, device, 1000, 64).unwrap();
        assert_eq!(big.offset, 0);
        assert_eq!(rt.data_contents(big.buffer).map(<[u8]>::len), Some(1256));
    }

    #[test]
    fn rewind_reuses_pages_and_release_destroys_them() {
        let (mut rt, device) = runtime_with_device();
        let mut pages = PageAllocator::new(256);

        let first = pages.allocate(&mut rt, device, 100, 4).unwrap();
        pages.rewind();
        assert_eq!(pages.used(), 0);
        let again = pages.allocate(&mut rt, device, 100, 4).unwrap();
        assert_eq!(first, again);
        assert_eq!(rt.stats().data_buffers_created, 1);

        pages.release(&mut rt, device);
        assert_eq!(pages.page_count(), 0);
        assert_eq!(rt.live_data_buffers(), 0);
    }

    #[test]
    fn runtime_failure_is_passed_through() {
        let (mut rt, device) = runtime_with_device();
        rt.fail_data_buffer = Some(BackendError::Recoverable("out of video memory".into()));
        let mut pages = PageAllocator::new(256);

        assert!(pages.allocate(&mut rt, device, 16, 4).is_err());
        assert_eq!(pages.page_count(), 0);
    }
}
