use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::backend::Extent;

#[derive(Debug, Default)]
struct ResizeState {
    /// `width << 32 | height`
    extent: AtomicU64,
    stale: AtomicBool,
}

fn pack(extent: Extent) -> u64 {
    (u64::from(extent.width) << 32) | u64::from(extent.height)
}

fn unpack(raw: u64) -> Extent {
    Extent::new((raw >> 32) as u32, raw as u32)
}

/// Cross-thread resize notifier.
///
/// Cheap to clone; every clone feeds the same surface. Notifications only mark
/// the surface stale, the presentation engine reacts on its next
/// `acquire_next` or `reconfigure`.
#[derive(Debug, Clone, Default)]
pub struct ResizeSignal {
    state: Arc<ResizeState>,
}

impl ResizeSignal {
    pub fn new(extent: Extent) -> Self {
        let signal = Self::default();
        signal.reset(extent);
        signal
    }

    /// Records new surface geometry and marks the surface stale.
    pub fn notify(&self, extent: Extent) {
        self.state.extent.store(pack(extent), Ordering::Release);
        self.state.stale.store(true, Ordering::Release);
    }

    pub fn is_stale(&self) -> bool {
        self.state.stale.load(Ordering::Acquire)
    }

    /// Last geometry recorded.
    pub fn extent(&self) -> Extent {
        unpack(self.state.extent.load(Ordering::Acquire))
    }

    /// Clears the stale flag and returns the latest geometry.
    pub(crate) fn take(&self) -> Extent {
        self.state.stale.swap(false, Ordering::AcqRel);
        self.extent()
    }

    pub(crate) fn reset(&self, extent: Extent) {
        self.state.extent.store(pack(extent), Ordering::Release);
        self.state.stale.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_marks_stale_and_take_clears() {
        let signal = ResizeSignal::new(Extent::new(640, 480));
        assert!(!signal.is_stale());

        signal.notify(Extent::new(800, 600));
        assert!(signal.is_stale());
        assert_eq!(signal.take(), Extent::new(800, 600));
        assert!(!signal.is_stale());
    }

    #[test]
    fn clones_share_state_across_threads() {
        let signal = ResizeSignal::new(Extent::new(1, 1));
        let remote = signal.clone();
        std::thread::spawn(move || remote.notify(Extent::new(u32::MAX, 7)))
            .join()
            .unwrap();

        assert!(signal.is_stale());
        assert_eq!(signal.extent(), Extent::new(u32::MAX, 7));
    }
}
