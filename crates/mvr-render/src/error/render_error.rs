use std::fmt;

use crate::backend::BackendError;

/// Numeric code reported for a successful operation.
pub const SUCCESS_CODE: i32 = 0;

/// Failure domain of a [`RenderError`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorDomain {
    /// Lifecycle misuse and invalid handles.
    General,
    /// The windowing system.
    Windowing,
    /// The graphics API runtime.
    Graphics,
}

/// Failure outcome of a public operation.
///
/// Non-critical variants are locally recoverable: the caller may retry the same
/// operation with adjusted parameters. Critical variants are fatal to the
/// session; the only valid response is `shutdown` followed by a fresh
/// `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Programming error: invalid handle or out-of-order lifecycle call.
    Failure(String),
    /// No device meets the requirements. Recoverable by relaxing them.
    NoDevice(String),
    /// Recoverable windowing-system failure.
    Windowing(String),
    /// The windowing subsystem is unusable.
    CriticalWindowing(String),
    /// Recoverable graphics-API failure (e.g. an out-of-date surface).
    Graphics(String),
    /// The graphics runtime or device is unusable (e.g. device loss).
    CriticalGraphics(String),
}

/// Result type returned by every public operation.
pub type RenderResult<T = ()> = Result<T, RenderError>;

impl RenderError {
    pub fn failure(message: impl Into<String>) -> Self {
        RenderError::Failure(message.into())
    }

    pub fn graphics(message: impl Into<String>) -> Self {
        RenderError::Graphics(message.into())
    }

    pub fn critical_graphics(message: impl Into<String>) -> Self {
        RenderError::CriticalGraphics(message.into())
    }

    /// Maps a collaborator error into the given domain, keeping its severity.
    pub fn from_backend(domain: ErrorDomain, err: BackendError) -> Self {
        let critical = err.is_critical();
        let message = err.into_message();
        match (domain, critical) {
            (ErrorDomain::General, _) => RenderError::Failure(message),
            (ErrorDomain::Windowing, false) => RenderError::Windowing(message),
            (ErrorDomain::Windowing, true) => RenderError::CriticalWindowing(message),
            (ErrorDomain::Graphics, false) => RenderError::Graphics(message),
            (ErrorDomain::Graphics, true) => RenderError::CriticalGraphics(message),
        }
    }

    /// Returns `true` when the session must be torn down and re-initialized.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            RenderError::CriticalWindowing(_) | RenderError::CriticalGraphics(_)
        )
    }

    pub fn domain(&self) -> ErrorDomain {
        match self {
            RenderError::Failure(_) => ErrorDomain::General,
            RenderError::Windowing(_) | RenderError::CriticalWindowing(_) => ErrorDomain::Windowing,
            RenderError::NoDevice(_)
            | RenderError::Graphics(_)
            | RenderError::CriticalGraphics(_) => ErrorDomain::Graphics,
        }
    }

    /// Stable numeric code.
    ///
    /// Negative codes are fatal to the session (`-1` marks a programming
    /// error), positive codes are recoverable.
    pub fn code(&self) -> i32 {
        match self {
            RenderError::Failure(_) => -1,
            RenderError::CriticalWindowing(_) => -2,
            RenderError::CriticalGraphics(_) => -3,
            RenderError::Windowing(_) => 1,
            RenderError::Graphics(_) => 2,
            RenderError::NoDevice(_) => 3,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RenderError::Failure(m)
            | RenderError::NoDevice(m)
            | RenderError::Windowing(m)
            | RenderError::CriticalWindowing(m)
            | RenderError::Graphics(m)
            | RenderError::CriticalGraphics(m) => m,
        }
    }
}

/// Collapses a result into its numeric code.
pub fn result_code<T>(result: &RenderResult<T>) -> i32 {
    match result {
        Ok(_) => SUCCESS_CODE,
        Err(err) => err.code(),
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Failure(m) => write!(f, "renderer failure: {m}"),
            RenderError::NoDevice(m) => write!(f, "no suitable graphics device: {m}"),
            RenderError::Windowing(m) => write!(f, "windowing error: {m}"),
            RenderError::CriticalWindowing(m) => write!(f, "critical windowing error: {m}"),
            RenderError::Graphics(m) => write!(f, "graphics error: {m}"),
            RenderError::CriticalGraphics(m) => write!(f, "critical graphics error: {m}"),
        }
    }
}

impl std::error::Error for RenderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_variants() {
        assert!(RenderError::CriticalGraphics("lost".into()).is_critical());
        assert!(RenderError::CriticalWindowing("gone".into()).is_critical());
        assert!(!RenderError::Graphics("stale".into()).is_critical());
        assert!(!RenderError::NoDevice("none".into()).is_critical());
        assert!(!RenderError::Failure("oops".into()).is_critical());
    }

    #[test]
    fn codes_are_distinct() {
        let all = [
            RenderError::Failure(String::new()),
            RenderError::NoDevice(String::new()),
            RenderError::Windowing(String::new()),
            RenderError::CriticalWindowing(String::new()),
            RenderError::Graphics(String::new()),
            RenderError::CriticalGraphics(String::new()),
        ];
        let mut codes: Vec<i32> = all.iter().map(RenderError::code).collect();
        codes.push(SUCCESS_CODE);
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len() + 1);
    }

    #[test]
    fn critical_codes_are_negative() {
        assert!(RenderError::CriticalWindowing(String::new()).code() < 0);
        assert!(RenderError::CriticalGraphics(String::new()).code() < 0);
        assert!(RenderError::Graphics(String::new()).code() > 0);
    }

    #[test]
    fn backend_errors_keep_severity() {
        let e = RenderError::from_backend(
            ErrorDomain::Graphics,
            BackendError::Critical("device lost".into()),
        );
        assert_eq!(e, RenderError::CriticalGraphics("device lost".into()));

        let e = RenderError::from_backend(
            ErrorDomain::Windowing,
            BackendError::Recoverable("no window".into()),
        );
        assert_eq!(e, RenderError::Windowing("no window".into()));
        assert_eq!(e.domain(), ErrorDomain::Windowing);
    }

    #[test]
    fn result_code_of_ok_is_success() {
        assert_eq!(result_code(&Ok::<(), RenderError>(())), SUCCESS_CODE);
        assert_eq!(result_code::<()>(&Err(RenderError::graphics("stale"))), 2);
    }

    #[test]
    fn display_includes_message() {
        let e = RenderError::NoDevice("no presentation queue".into());
        assert_eq!(e.to_string(), "no suitable graphics device: no presentation queue");
    }
}
