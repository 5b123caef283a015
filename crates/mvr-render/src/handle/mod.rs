//! Opaque handles.
//!
//! GPU-visible resources are referenced by small integer handles managed by a
//! registry (arena + index + generation), so stale use becomes a validity check.

mod ids;
mod registry;

pub use ids::{Buffer, DataBuffer, Handle, HandleKind, INVALID_HANDLE};
pub use registry::HandleRegistry;
