use crate::backend::{ApiVersion, DeviceType};

/// Device-selection preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePreferences {
    /// Ranked first when several devices qualify.
    pub preferred_type: DeviceType,
    /// When set, only devices of this type are considered.
    pub required_type: Option<DeviceType>,
    /// Devices reporting an older API version are rejected.
    pub minimum_api_version: ApiVersion,
}

impl Default for DevicePreferences {
    fn default() -> Self {
        Self {
            preferred_type: DeviceType::DiscreteGpu,
            required_type: None,
            minimum_api_version: ApiVersion::default(),
        }
    }
}

impl DevicePreferences {
    pub fn with_preferred_type(mut self, device_type: DeviceType) -> Self {
        self.preferred_type = device_type;
        self
    }

    pub fn with_required_type(mut self, device_type: DeviceType) -> Self {
        self.required_type = Some(device_type);
        self
    }

    pub fn with_minimum_api_version(mut self, version: ApiVersion) -> Self {
        self.minimum_api_version = version;
        self
    }
}
