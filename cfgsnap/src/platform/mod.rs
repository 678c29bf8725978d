//! Platform definitions for the supported device families.
//!
//! A [`PlatformDefinition`] carries a family's data (extension, timeouts,
//! remote paths, ignore rule); the vendor modules pair it with the state
//! machine that drives the device.

mod definition;
mod family;
mod registry;
pub mod vendors;

pub use definition::PlatformDefinition;
pub use family::DeviceFamily;
pub use registry::{AnyDriver, PlatformRegistry};
