//! Unified result taxonomy.
//!
//! Windowing and graphics failures share one closed enum with a domain tag and
//! a critical/recoverable axis, so callers branch on data.

mod render_error;

pub use render_error::{result_code, ErrorDomain, RenderError, RenderResult, SUCCESS_CODE};
