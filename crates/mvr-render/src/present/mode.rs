use std::fmt;
use std::str::FromStr;

/// Upper bound on the rotation depth when the surface reports no limit.
pub const DEFAULT_MAX_BUFFER_COUNT: u32 = 8;

/// Presentation policy.
///
/// Pure data: the mode drives the rotation-depth computation and whether
/// acquisition may block.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum PresentMode {
    /// Paced to the display refresh, no tearing. Always supported.
    #[default]
    Vsync,
    /// Mailbox: an extra buffer so the producer never waits on the display.
    TripleBuffer,
    /// Present as soon as ready; tearing is possible.
    Immediate,
}

impl PresentMode {
    pub const ALL: [PresentMode; 3] = [
        PresentMode::Vsync,
        PresentMode::TripleBuffer,
        PresentMode::Immediate,
    ];

    /// Smallest rotation depth the mode can operate with.
    pub const fn min_buffer_count(self) -> u32 {
        match self {
            PresentMode::Vsync => 2,
            PresentMode::TripleBuffer => 3,
            PresentMode::Immediate => 1,
        }
    }

    /// Whether `acquire_next` may suspend the caller under this mode.
    pub const fn blocks_on_acquire(self) -> bool {
        matches!(self, PresentMode::Vsync)
    }

    /// Clamps a caller hint into the valid depth range for this mode.
    ///
    /// `surface_max` is the surface limit (`None` = unbounded). The mode minimum
    /// wins over a smaller surface limit.
    pub fn clamp_buffer_count(self, hint: u32, surface_max: Option<u32>) -> u32 {
        let min = self.min_buffer_count();
        let max = surface_max.unwrap_or(DEFAULT_MAX_BUFFER_COUNT).max(min);
        hint.clamp(min, max)
    }

    /// Picks the mode to actually use given what the surface supports.
    ///
    /// Falls back to [`PresentMode::Vsync`], which every surface must offer.
    pub fn resolve(self, supported: &[PresentMode]) -> PresentMode {
        if supported.contains(&self) {
            self
        } else {
            PresentMode::Vsync
        }
    }
}

impl fmt::Display for PresentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PresentMode::Vsync => "vsync",
            PresentMode::TripleBuffer => "triple-buffer",
            PresentMode::Immediate => "immediate",
        };
        f.write_str(s)
    }
}

/// Error returned when parsing an unknown present mode name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePresentModeError(String);

impl fmt::Display for ParsePresentModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown present mode '{}' (expected vsync, triple-buffer or immediate)",
            self.0
        )
    }
}

impl std::error::Error for ParsePresentModeError {}

impl FromStr for PresentMode {
    type Err = ParsePresentModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vsync" | "fifo" => Ok(PresentMode::Vsync),
            "triple" | "triple-buffer" | "triple_buffer" | "mailbox" => Ok(PresentMode::TripleBuffer),
            "immediate" => Ok(PresentMode::Immediate),
            _ => Err(ParsePresentModeError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triple_buffer_hint_one_yields_three() {
        assert_eq!(PresentMode::TripleBuffer.clamp_buffer_count(1, None), 3);
        assert_eq!(PresentMode::TripleBuffer.clamp_buffer_count(1, Some(2)), 3);
    }

    #[test]
    fn vsync_forces_two() {
        assert_eq!(PresentMode::Vsync.clamp_buffer_count(0, None), 2);
        assert_eq!(PresentMode::Vsync.clamp_buffer_count(1, Some(8)), 2);
    }

    #[test]
    fn immediate_allows_one() {
        assert_eq!(PresentMode::Immediate.clamp_buffer_count(1, None), 1);
        assert_eq!(PresentMode::Immediate.clamp_buffer_count(0, None), 1);
    }

    #[test]
    fn hint_clamped_to_surface_max() {
        assert_eq!(PresentMode::Vsync.clamp_buffer_count(16, Some(4)), 4);
        assert_eq!(
            PresentMode::Immediate.clamp_buffer_count(u32::MAX, None),
            DEFAULT_MAX_BUFFER_COUNT
        );
    }

    #[test]
    fn unsupported_mode_falls_back_to_vsync() {
        let supported = [PresentMode::Vsync, PresentMode::Immediate];
        assert_eq!(PresentMode::TripleBuffer.resolve(&supported), PresentMode::Vsync);
        assert_eq!(PresentMode::Immediate.resolve(&supported), PresentMode::Immediate);
    }

    #[test]
    fn parse_names() {
        assert_eq!("VSync".parse::<PresentMode>(), Ok(PresentMode::Vsync));
        assert_eq!("mailbox".parse::<PresentMode>(), Ok(PresentMode::TripleBuffer));
        assert_eq!(" immediate ".parse::<PresentMode>(), Ok(PresentMode::Immediate));
        assert!("tearing".parse::<PresentMode>().is_err());
    }

    #[test]
    fn only_vsync_blocks() {
        assert!(PresentMode::Vsync.blocks_on_acquire());
        assert!(!PresentMode::TripleBuffer.blocks_on_acquire());
        assert!(!PresentMode::Immediate.blocks_on_acquire());
    }
}
