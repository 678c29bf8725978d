//! The closed set of device families.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Which driver handles a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    /// Access/distribution switch with an IOS-style CLI.
    CiscoSwitch,
    /// Virtualised packet core node driven over exec channels.
    CiscoVepc,
    /// Packet gateway with `[local]host#` prompts.
    EricssonEpg,
    /// Core node reached through its ANCB Linux shell.
    EricssonMk,
    /// BIND name server.
    BindDns,
}

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 5] = [
        DeviceFamily::CiscoSwitch,
        DeviceFamily::CiscoVepc,
        DeviceFamily::EricssonEpg,
        DeviceFamily::EricssonMk,
        DeviceFamily::BindDns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::CiscoSwitch => "cisco_switch",
            DeviceFamily::CiscoVepc => "cisco_vepc",
            DeviceFamily::EricssonEpg => "ericsson_epg",
            DeviceFamily::EricssonMk => "ericsson_mk",
            DeviceFamily::BindDns => "bind_dns",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceFamily {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == s)
            .ok_or_else(|| DriverError::UnknownFamily { name: s.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for family in DeviceFamily::ALL {
            assert_eq!(family.as_str().parse::<DeviceFamily>().unwrap(), family);
        }
        assert!("juniper".parse::<DeviceFamily>().is_err());
    }
}
