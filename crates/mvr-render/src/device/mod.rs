//! Device selection and lifetime.

mod context;
mod preferences;
mod select;

pub use context::DeviceContext;
pub use preferences::DevicePreferences;
pub use select::{select_device, validate_device};
