use std::fmt;

/// Kind of resource a [`Handle`] refers to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum HandleKind {
    Device = 1,
    Surface = 2,
    Buffer = 3,
    /// Temporary or permanent data buffer.
    Data = 4,
}

impl HandleKind {
    pub const ALL: [HandleKind; 4] = [
        HandleKind::Device,
        HandleKind::Surface,
        HandleKind::Buffer,
        HandleKind::Data,
    ];

    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(HandleKind::Device),
            2 => Some(HandleKind::Surface),
            3 => Some(HandleKind::Buffer),
            4 => Some(HandleKind::Data),
            _ => None,
        }
    }
}

// Layout (msb → lsb): kind:4 | registry:12 | generation:16 | index:32.
const KIND_SHIFT: u32 = 60;
const REGISTRY_SHIFT: u32 = 48;
const GENERATION_SHIFT: u32 = 32;
const REGISTRY_MASK: u64 = 0x0fff;
const GENERATION_MASK: u64 = 0xffff;
const INDEX_MASK: u64 = 0xffff_ffff;

/// Largest registry tag that fits in a handle.
pub(crate) const MAX_REGISTRY_TAG: u16 = REGISTRY_MASK as u16;

/// Typed opaque resource identifier.
///
/// A handle encodes the resource kind, the registry (session) that issued it,
/// a slot generation and a slot index. It carries no ownership; validity is
/// checked against the issuing [`HandleRegistry`](super::HandleRegistry).
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

/// Sentinel that never denotes a live resource, for every kind.
///
/// Issued handles always carry a non-zero kind tag, so the raw value `0` is
/// reserved across all kinds.
pub const INVALID_HANDLE: Handle = Handle(0);

impl Handle {
    pub(crate) fn pack(kind: HandleKind, registry: u16, generation: u16, index: u32) -> Self {
        Handle(
            ((kind as u64) << KIND_SHIFT)
                | ((registry as u64 & REGISTRY_MASK) << REGISTRY_SHIFT)
                | ((generation as u64) << GENERATION_SHIFT)
                | index as u64,
        )
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.0 == INVALID_HANDLE.0
    }

    /// Returns the kind encoded in the handle, `None` for the sentinel or garbage.
    pub fn kind(self) -> Option<HandleKind> {
        HandleKind::from_bits((self.0 >> KIND_SHIFT) as u8)
    }

    pub(crate) fn registry(self) -> u16 {
        ((self.0 >> REGISTRY_SHIFT) & REGISTRY_MASK) as u16
    }

    pub(crate) fn generation(self) -> u16 {
        ((self.0 >> GENERATION_SHIFT) & GENERATION_MASK) as u16
    }

    pub(crate) fn index(self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }
}

impl Default for Handle {
    fn default() -> Self {
        INVALID_HANDLE
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            None => write!(f, "Handle(INVALID)"),
            Some(kind) => write!(
                f,
                "Handle({kind:?}#{} g{} r{})",
                self.index(),
                self.generation(),
                self.registry()
            ),
        }
    }
}

/// Opaque handle to a presentable buffer.
///
/// Owned by the presentation engine; the caller only borrows it between
/// `acquire_next` and `present`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Buffer(Handle);

impl Buffer {
    pub const INVALID: Buffer = Buffer(INVALID_HANDLE);

    pub(crate) fn from_handle(handle: Handle) -> Self {
        Buffer(handle)
    }

    #[inline]
    pub const fn handle(self) -> Handle {
        self.0
    }

    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.0.is_invalid()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer({:?})", self.0)
    }
}

/// Opaque handle to a data buffer (vertex, index, uniform or storage data).
///
/// Temporary data buffers stop being valid at the next successful present;
/// permanent ones live until destroyed or until the session ends.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct DataBuffer(Handle);

impl DataBuffer {
    pub const INVALID: DataBuffer = DataBuffer(INVALID_HANDLE);

    pub(crate) fn from_handle(handle: Handle) -> Self {
        DataBuffer(handle)
    }

    #[inline]
    pub const fn handle(self) -> Handle {
        self.0
    }

    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.0.is_invalid()
    }
}

impl fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataBuffer({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_roundtrips_fields() {
        let h = Handle::pack(HandleKind::Surface, 7, 300, 42);
        assert_eq!(h.kind(), Some(HandleKind::Surface));
        assert_eq!(h.registry(), 7);
        assert_eq!(h.generation(), 300);
        assert_eq!(h.index(), 42);
    }

    #[test]
    fn packed_handle_is_never_invalid() {
        for kind in HandleKind::ALL {
            assert!(!Handle::pack(kind, 0, 0, 0).is_invalid());
        }
    }

    #[test]
    fn sentinel_has_no_kind() {
        assert_eq!(INVALID_HANDLE.kind(), None);
        assert!(Buffer::INVALID.is_invalid());
        assert!(DataBuffer::INVALID.is_invalid());
        assert_eq!(Handle::default(), INVALID_HANDLE);
    }
}
