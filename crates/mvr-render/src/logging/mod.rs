//! Logging utilities.
//!
//! Logger initialization over the `log` facade, plus the per-thread record of
//! the last failure.

mod init;
mod last_error;

pub use init::{LoggingConfig, init_logging};
pub use last_error::last_error;
pub(crate) use last_error::{clear_last_error, set_last_error};
