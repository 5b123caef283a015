use crate::backend::{DeviceDescriptor, DeviceType};

use super::preferences::DevicePreferences;

/// Picks the best device for the given preferences.
///
/// Returns `None` when no device passes [`validate_device`].
pub fn select_device<'a>(
    devices: &'a [DeviceDescriptor],
    prefs: &DevicePreferences,
) -> Option<&'a DeviceDescriptor> {
    let mut candidates = devices.iter().filter(|d| validate_device(d, prefs));
    let first = candidates.next()?;
    Some(candidates.fold(first, |best, other| choose_better_device(best, other, prefs)))
}

/// A device qualifies when it can present, meets the minimum API version and
/// matches the required type, if any.
pub fn validate_device(device: &DeviceDescriptor, prefs: &DevicePreferences) -> bool {
    if !device.supports_present {
        return false;
    }
    if device.api_version < prefs.minimum_api_version {
        return false;
    }
    match prefs.required_type {
        Some(required) => device.device_type == required,
        None => true,
    }
}

/// Keeps `first` on ties, so enumeration order breaks them.
fn choose_better_device<'a>(
    first: &'a DeviceDescriptor,
    second: &'a DeviceDescriptor,
    prefs: &DevicePreferences,
) -> &'a DeviceDescriptor {
    let a = (type_rank(first.device_type, prefs), first.api_version);
    let b = (type_rank(second.device_type, prefs), second.api_version);
    if b > a { second } else { first }
}

/// Higher is better.
fn type_rank(device_type: DeviceType, prefs: &DevicePreferences) -> u8 {
    if device_type == prefs.preferred_type {
        return 6;
    }
    match device_type {
        DeviceType::DiscreteGpu => 5,
        DeviceType::IntegratedGpu => 4,
        DeviceType::VirtualGpu => 3,
        DeviceType::Other => 2,
        DeviceType::Cpu => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ApiVersion;

    fn device(index: u32, device_type: DeviceType, minor: u32, present: bool) -> DeviceDescriptor {
        DeviceDescriptor {
            index,
            name: format!("dev{index}"),
            device_type,
            api_version: ApiVersion::new(1, minor),
            supports_present: present,
        }
    }

    #[test]
    fn discrete_beats_integrated() {
        let devices = [
            device(0, DeviceType::IntegratedGpu, 3, true),
            device(1, DeviceType::DiscreteGpu, 1, true),
        ];
        let picked = select_device(&devices, &DevicePreferences::default()).unwrap();
        assert_eq!(picked.index, 1);
    }

    #[test]
    fn preferred_type_wins() {
        let devices = [
            device(0, DeviceType::DiscreteGpu, 3, true),
            device(1, DeviceType::IntegratedGpu, 0, true),
        ];
        let prefs = DevicePreferences::default().with_preferred_type(DeviceType::IntegratedGpu);
        assert_eq!(select_device(&devices, &prefs).unwrap().index, 1);
    }

    #[test]
    fn present_support_is_mandatory() {
        let devices = [
            device(0, DeviceType::DiscreteGpu, 3, false),
            device(1, DeviceType::Cpu, 0, true),
        ];
        let picked = select_device(&devices, &DevicePreferences::default()).unwrap();
        assert_eq!(picked.index, 1);

        let none = [device(0, DeviceType::DiscreteGpu, 3, false)];
        assert!(select_device(&none, &DevicePreferences::default()).is_none());
    }

    #[test]
    fn ties_go_to_api_version_then_order() {
        let devices = [
            device(0, DeviceType::DiscreteGpu, 1, true),
            device(1, DeviceType::DiscreteGpu, 2, true),
            device(2, DeviceType::DiscreteGpu, 2, true),
        ];
        let picked = select_device(&devices, &DevicePreferences::default()).unwrap();
        assert_eq!(picked.index, 1);
    }

    #[test]
    fn required_type_filters() {
        let devices = [
            device(0, DeviceType::DiscreteGpu, 3, true),
            device(1, DeviceType::VirtualGpu, 0, true),
        ];
        let prefs = DevicePreferences::default().with_required_type(DeviceType::VirtualGpu);
        assert_eq!(select_device(&devices, &prefs).unwrap().index, 1);

        let prefs = DevicePreferences::default().with_required_type(DeviceType::Cpu);
        assert!(select_device(&devices, &prefs).is_none());
    }

    #[test]
    fn minimum_api_version_filters() {
        let devices = [device(0, DeviceType::DiscreteGpu, 0, true)];
        let prefs = DevicePreferences::default().with_minimum_api_version(ApiVersion::new(1, 2));
        assert!(select_device(&devices, &prefs).is_none());
    }
}
