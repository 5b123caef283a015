//! Present modes, the buffer rotation and the per-frame protocol.

mod engine;
mod mode;
mod rotation;

pub use engine::{EngineState, PresentationEngine};
pub use mode::{DEFAULT_MAX_BUFFER_COUNT, ParsePresentModeError, PresentMode};
