use std::fmt;

use crate::present::PresentMode;

/// Surface identifier issued by a [`WindowSystem`](super::WindowSystem).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SurfaceId(pub u64);

/// Device identifier issued by a [`GraphicsRuntime`](super::GraphicsRuntime).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DeviceId(pub u64);

/// Presentable buffer identifier issued by a [`GraphicsRuntime`](super::GraphicsRuntime).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BufferId(pub u64);

/// Data buffer identifier issued by a [`GraphicsRuntime`](super::GraphicsRuntime).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DataBufferId(pub u64);

/// Key of a window known to the window system.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct WindowKey(pub u64);

/// Drawable size in physical pixels.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-sized surface (e.g. a minimized window) cannot be presented to.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<winit::dpi::PhysicalSize<u32>> for Extent {
    fn from(size: winit::dpi::PhysicalSize<u32>) -> Self {
        Extent::new(size.width, size.height)
    }
}

/// Describes the window a surface should be created for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowDescriptor {
    pub window: WindowKey,
}

impl WindowDescriptor {
    pub const fn new(window: WindowKey) -> Self {
        Self { window }
    }
}

/// Broad class of a graphics device.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DeviceType {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
    Cpu,
    Other,
}

/// Graphics API version reported by a device.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Position in the enumeration; runtimes use it to find the device again.
    pub index: u32,
    pub name: String,
    pub device_type: DeviceType,
    pub api_version: ApiVersion,
    /// Whether the device exposes a queue able to present to surfaces.
    pub supports_present: bool,
}

/// What a device can do with a given surface.
///
/// An empty `present_modes` list means the device cannot present to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub present_modes: Vec<PresentMode>,
    pub min_buffer_count: u32,
    /// `None` when the runtime imposes no limit.
    pub max_buffer_count: Option<u32>,
}

impl SurfaceCapabilities {
    pub fn is_presentable(&self) -> bool {
        !self.present_modes.is_empty()
    }
}

/// Surface configuration applied before presentable buffers are created.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SurfaceConfig {
    pub extent: Extent,
    pub present_mode: PresentMode,
    pub buffer_count: u32,
}

/// Options handed to [`GraphicsRuntime::initialize`](super::GraphicsRuntime::initialize).
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub application_name: String,
    /// Enables runtime validation (e.g. Vulkan validation layers).
    pub debug: bool,
}

/// Outcome of a present submission that reached the runtime.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PresentStatus {
    Presented,
    /// The surface no longer matches the buffer geometry; nothing was shown.
    Outdated,
    DeviceLost,
}

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The call failed but the collaborator remains usable.
    Recoverable(String),
    /// The collaborator itself is unusable.
    Critical(String),
}

impl BackendError {
    pub fn is_critical(&self) -> bool {
        matches!(self, BackendError::Critical(_))
    }

    pub fn message(&self) -> &str {
        match self {
            BackendError::Recoverable(m) | BackendError::Critical(m) => m,
        }
    }

    pub fn into_message(self) -> String {
        match self {
            BackendError::Recoverable(m) | BackendError::Critical(m) => m,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Recoverable(m) => write!(f, "{m}"),
            BackendError::Critical(m) => write!(f, "{m} (critical)"),
        }
    }
}

impl std::error::Error for BackendError {}
