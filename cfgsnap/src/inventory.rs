//! Hosts to back up.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::ConfigError;
use crate::platform::DeviceFamily;

/// One device, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// Unique key; also the repository directory and artifact name stem.
    pub hostname: String,
    /// Management address.
    pub address: String,
    pub port: u16,
    pub family: DeviceFamily,
    /// Name of the credentials entry to log in with.
    pub credentials: String,
}

/// The set of devices of a run, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    devices: Vec<DeviceDescriptor>,
}

impl Inventory {
    /// Build an inventory, rejecting duplicate hostnames.
    pub fn new(devices: Vec<DeviceDescriptor>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for device in &devices {
            if !seen.insert(device.hostname.as_str()) {
                return Err(ConfigError::DuplicateHost {
                    hostname: device.hostname.clone(),
                });
            }
        }
        Ok(Self { devices })
    }

    /// Keep only the named hosts. An empty filter keeps everything.
    ///
    /// Unknown names are returned so the caller can report them.
    pub fn retain_hosts(&mut self, hosts: &[String]) -> Vec<String> {
        if hosts.is_empty() {
            return Vec::new();
        }
        let unknown = hosts
            .iter()
            .filter(|h| !self.devices.iter().any(|d| &d.hostname == *h))
            .cloned()
            .collect();
        self.devices.retain(|d| hosts.contains(&d.hostname));
        unknown
    }

    pub fn get(&self, hostname: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.hostname == hostname)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.iter()
    }

    /// Devices of one family.
    pub fn by_family(&self, family: DeviceFamily) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.iter().filter(move |d| d.family == family)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl IntoIterator for Inventory {
    type Item = DeviceDescriptor;
    type IntoIter = std::vec::IntoIter<DeviceDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(hostname: &str, family: DeviceFamily) -> DeviceDescriptor {
        DeviceDescriptor {
            hostname: hostname.to_string(),
            address: "192.0.2.1".to_string(),
            port: 22,
            family,
            credentials: "default".to_string(),
        }
    }

    #[test]
    fn test_duplicate_hostname_rejected() {
        let err = Inventory::new(vec![
            device("SW1", DeviceFamily::CiscoSwitch),
            device("SW1", DeviceFamily::CiscoVepc),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateHost { hostname } if hostname == "SW1"));
    }

    #[test]
    fn test_retain_hosts() {
        let mut inventory = Inventory::new(vec![
            device("SW1", DeviceFamily::CiscoSwitch),
            device("SW2", DeviceFamily::CiscoSwitch),
            device("DNS", DeviceFamily::BindDns),
        ])
        .unwrap();

        let unknown = inventory.retain_hosts(&["DNS".to_string(), "NOPE".to_string()]);
        assert_eq!(unknown, vec!["NOPE".to_string()]);
        assert_eq!(inventory.len(), 1);
        assert!(inventory.get("DNS").is_some());
        assert_eq!(inventory.by_family(DeviceFamily::CiscoSwitch).count(), 0);
    }

    #[test]
    fn test_empty_filter_keeps_all() {
        let mut inventory =
            Inventory::new(vec![device("SW1", DeviceFamily::CiscoSwitch)]).unwrap();
        assert!(inventory.retain_hosts(&[]).is_empty());
        assert_eq!(inventory.len(), 1);
    }
}
