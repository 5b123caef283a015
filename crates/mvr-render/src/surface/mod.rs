//! Window-system surface binding and resize tracking.

mod binder;
mod resize;

pub use binder::SurfaceBinder;
pub use resize::ResizeSignal;
