use crate::backend::WindowDescriptor;
use crate::device::DevicePreferences;
use crate::present::PresentMode;

/// Everything [`Renderer::initialize`](super::Renderer::initialize) needs.
///
/// Taken by value; the renderer keeps nothing borrowed from it.
#[derive(Debug, Clone)]
pub struct InitializeParams {
    pub window: WindowDescriptor,
    pub present_mode: PresentMode,
    /// Desired rotation depth; clamped per mode, never an error.
    pub buffer_count_hint: u32,
    pub device: DevicePreferences,
    /// Enables graphics-runtime validation.
    pub debug: bool,
    pub application_name: String,
}

impl InitializeParams {
    pub fn new(window: WindowDescriptor) -> Self {
        Self {
            window,
            present_mode: PresentMode::default(),
            buffer_count_hint: 3,
            device: DevicePreferences::default(),
            debug: false,
            application_name: "mvr".to_string(),
        }
    }

    pub fn with_present_mode(mut self, mode: PresentMode) -> Self {
        self.present_mode = mode;
        self
    }

    pub fn with_buffer_count_hint(mut self, hint: u32) -> Self {
        self.buffer_count_hint = hint;
        self
    }

    pub fn with_device_preferences(mut self, prefs: DevicePreferences) -> Self {
        self.device = prefs;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }
}
