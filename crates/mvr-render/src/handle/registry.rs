use std::sync::atomic::{AtomicU16, Ordering};

use crate::error::{RenderError, RenderResult};

use super::ids::{Handle, HandleKind, MAX_REGISTRY_TAG};

static NEXT_REGISTRY_TAG: AtomicU16 = AtomicU16::new(0);

fn next_registry_tag() -> u16 {
    NEXT_REGISTRY_TAG.fetch_add(1, Ordering::Relaxed) % MAX_REGISTRY_TAG + 1
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u16,
    live: Option<HandleKind>,
}

/// Arena of opaque handles.
///
/// Pure bookkeeping: owns no external resources. Released slots are reused
/// with a bumped generation, so stale copies of a handle stay invalid. Every
/// registry carries its own tag, which makes handles from another session
/// foreign.
#[derive(Debug)]
pub struct HandleRegistry {
    tag: u16,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            tag: next_registry_tag(),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Issues a new handle of the given kind. Never returns `INVALID_HANDLE`.
    pub fn allocate(&mut self, kind: HandleKind) -> Handle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    live: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.live = Some(kind);
        self.live += 1;

        Handle::pack(kind, self.tag, slot.generation, index)
    }

    /// Releases a live handle.
    ///
    /// Fails with `Failure` and leaves the registry untouched for the sentinel,
    /// an already released handle or a handle issued by another registry.
    pub fn release(&mut self, handle: Handle) -> RenderResult {
        if !self.is_valid(handle) {
            return Err(RenderError::failure(format!(
                "release of invalid handle {handle:?}"
            )));
        }

        let index = handle.index();
        let slot = &mut self.slots[index as usize];
        slot.live = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
        Ok(())
    }

    /// Returns `true` if `handle` is live in this registry.
    pub fn is_valid(&self, handle: Handle) -> bool {
        let Some(kind) = handle.kind() else {
            return false;
        };
        if handle.registry() != self.tag {
            return false;
        }
        match self.slots.get(handle.index() as usize) {
            Some(slot) => slot.live == Some(kind) && slot.generation == handle.generation(),
            None => false,
        }
    }

    /// Like [`is_valid`](Self::is_valid), additionally checking the kind.
    pub fn is_valid_kind(&self, handle: Handle, kind: HandleKind) -> bool {
        handle.kind() == Some(kind) && self.is_valid(handle)
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn live_count_of(&self, kind: HandleKind) -> usize {
        self.slots.iter().filter(|s| s.live == Some(kind)).count()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
