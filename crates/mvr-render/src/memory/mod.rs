//! Data buffers.
//!
//! Temporary buffers are suballocated from per-frame pages and recycled at
//! present; permanent buffers are managed by the caller.

mod allocator;
mod pages;

pub use allocator::{DataAllocator, DataRegion, FRAMES_IN_FLIGHT};
pub use pages::DEFAULT_PAGE_SIZE;
