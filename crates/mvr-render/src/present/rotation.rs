use crate::backend::BufferId;
use crate::handle::Buffer;

/// Ownership of one presentable buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum SlotState {
    /// Owned by the engine, not in use by the GPU.
    Free,
    /// Held by the caller for drawing.
    Acquired,
    /// Submitted for display; the GPU may still own it.
    Presented { sequence: u64 },
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub buffer: Buffer,
    pub raw: BufferId,
    pub state: SlotState,
}

/// Ring of presentable buffers.
#[derive(Debug, Default)]
pub(crate) struct Rotation {
    slots: Vec<Slot>,
    cursor: usize,
    sequence: u64,
}

impl Rotation {
    pub fn push(&mut self, buffer: Buffer, raw: BufferId) {
        self.slots.push(Slot {
            buffer,
            raw,
            state: SlotState::Free,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    pub fn set_state(&mut self, index: usize, state: SlotState) {
        self.slots[index].state = state;
    }

    pub fn find(&self, buffer: Buffer) -> Option<usize> {
        if buffer.is_invalid() {
            return None;
        }
        self.slots.iter().position(|s| s.buffer == buffer)
    }

    pub fn all_acquired(&self) -> bool {
        self.slots.iter().all(|s| s.state == SlotState::Acquired)
    }

    /// Next slot in strict rotation order, skipping slots the caller still
    /// holds. Advances the cursor past it.
    pub fn next_in_order(&mut self) -> Option<usize> {
        let len = self.slots.len();
        let index = (0..len)
            .map(|step| (self.cursor + step) % len)
            .find(|&i| self.slots[i].state != SlotState::Acquired)?;
        self.cursor = (index + 1) % len;
        Some(index)
    }

    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.state == SlotState::Free)
    }

    pub fn oldest_presented(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s.state {
                SlotState::Presented { sequence } => Some((sequence, i)),
                _ => None,
            })
            .min()
            .map(|(_, i)| i)
    }

    pub fn mark_presented(&mut self, index: usize) {
        self.sequence += 1;
        self.slots[index].state = SlotState::Presented {
            sequence: self.sequence,
        };
    }

    /// Indices of slots submitted for display.
    pub fn presented(&self) -> Vec<usize> {
        (0..self.slots.len())
            .filter(|&i| matches!(self.slots[i].state, SlotState::Presented { .. }))
            .collect()
    }

    /// Buffers not free for reuse: held by the caller or not yet retired.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.state != SlotState::Free).count()
    }

    pub fn buffers(&self) -> impl Iterator<Item = Buffer> + '_ {
        self.slots.iter().map(|s| s.buffer)
    }

    pub fn drain(&mut self) -> Vec<Slot> {
        self.cursor = 0;
        std::mem::take(&mut self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{HandleKind, HandleRegistry};

    fn rotation(depth: usize) -> Rotation {
        let mut reg = HandleRegistry::new();
        let mut rot = Rotation::default();
        for i in 0..depth {
            let buffer = Buffer::from_handle(reg.allocate(HandleKind::Buffer));
            rot.push(buffer, BufferId(i as u64 + 1));
        }
        rot
    }

    #[test]
    fn cursor_walks_in_order_and_skips_held() {
        let mut rot = rotation(3);
        assert_eq!(rot.next_in_order(), Some(0));
        rot.set_state(0, SlotState::Acquired);
        assert_eq!(rot.next_in_order(), Some(1));
        assert_eq!(rot.next_in_order(), Some(2));
        assert_eq!(rot.next_in_order(), Some(1));
    }

    #[test]
    fn oldest_presented_by_sequence() {
        let mut rot = rotation(3);
        rot.mark_presented(2);
        rot.mark_presented(0);
        assert_eq!(rot.oldest_presented(), Some(2));
        assert_eq!(rot.first_free(), Some(1));
        assert_eq!(rot.in_flight(), 2);
    }

    #[test]
    fn sentinel_is_never_found() {
        let rot = rotation(2);
        assert_eq!(rot.find(Buffer::INVALID), None);
    }
}
