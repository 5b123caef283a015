//! mvr presentation backend.
//!
//! Brings up a window surface and a GPU device, then rotates presentable
//! buffers under a chosen present mode. Per-frame and permanent data buffers
//! are handed out through the same handle scheme. Window system and graphics
//! runtime are collaborators behind the traits in [`backend`]; [`Renderer`]
//! sequences the lifecycle over them.

pub mod backend;
pub mod device;
pub mod error;
pub mod handle;
pub mod logging;
pub mod memory;
pub mod present;
pub mod renderer;
pub mod surface;

pub use error::{RenderError, RenderResult};
pub use handle::{Buffer, DataBuffer, INVALID_HANDLE};
pub use present::PresentMode;
pub use renderer::{InitializeParams, Renderer};
