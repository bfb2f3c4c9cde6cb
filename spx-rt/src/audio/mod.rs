//! Audio device layer
//!
//! Platform capability trait, the device selection policy, play-scoped device
//! locking, and the cpal and in-process platform implementations.

pub mod cpal_platform;
pub mod device;
pub mod lock;
pub mod virtual_platform;

pub use cpal_platform::CpalPlatform;
pub use device::{AudioPlatform, DeviceInfo, DeviceManager, HostApi, OutputStream, Selection};
pub use lock::{DeviceGuard, DeviceHandle};
pub use virtual_platform::VirtualPlatform;
