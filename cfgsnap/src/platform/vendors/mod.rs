//! Built-in device families.
//!
//! Each module exposes a `platform()` constructor with the family's
//! defaults, its prompt set and version extraction, and a driver
//! implementing [`DeviceDriver`](crate::driver::DeviceDriver).

pub mod bind_dns;
pub mod cisco_switch;
pub mod cisco_vepc;
pub mod ericsson_epg;
pub mod ericsson_mk;

use super::{DeviceFamily, PlatformDefinition};

/// Default definition for `family`.
pub fn platform(family: DeviceFamily) -> PlatformDefinition {
    match family {
        DeviceFamily::CiscoSwitch => cisco_switch::platform(),
        DeviceFamily::CiscoVepc => cisco_vepc::platform(),
        DeviceFamily::EricssonEpg => ericsson_epg::platform(),
        DeviceFamily::EricssonMk => ericsson_mk::platform(),
        DeviceFamily::BindDns => bind_dns::platform(),
    }
}
