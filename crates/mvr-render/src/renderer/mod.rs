//! Top-level lifecycle: initialize, per-frame acquire/present, shutdown.

mod controller;
mod params;

pub use controller::Renderer;
pub use params::InitializeParams;
