//! Family to driver lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::vendors::bind_dns::{BindDnsDriver, ZoneLayout};
use super::vendors::cisco_switch::CiscoSwitchDriver;
use super::vendors::cisco_vepc::CiscoVepcDriver;
use super::vendors::ericsson_epg::EricssonEpgDriver;
use super::vendors::ericsson_mk::EricssonMkDriver;
use super::vendors;
use super::{DeviceFamily, PlatformDefinition};
use crate::driver::{DeviceDriver, LicenseContext, LicenseStatus, RetrieveContext, Snapshot};
use crate::error::Result;
use crate::transport::Session;

/// Any built-in driver.
#[derive(Debug, Clone)]
pub enum AnyDriver {
    CiscoSwitch(CiscoSwitchDriver),
    CiscoVepc(CiscoVepcDriver),
    EricssonEpg(EricssonEpgDriver),
    EricssonMk(EricssonMkDriver),
    BindDns(BindDnsDriver),
}

impl AnyDriver {
    /// Driver for `platform.family`. `layout` is only used by DNS.
    pub fn new(platform: PlatformDefinition, layout: &ZoneLayout) -> Self {
        match platform.family {
            DeviceFamily::CiscoSwitch => AnyDriver::CiscoSwitch(CiscoSwitchDriver::new(platform)),
            DeviceFamily::CiscoVepc => AnyDriver::CiscoVepc(CiscoVepcDriver::new(platform)),
            DeviceFamily::EricssonEpg => AnyDriver::EricssonEpg(EricssonEpgDriver::new(platform)),
            DeviceFamily::EricssonMk => AnyDriver::EricssonMk(EricssonMkDriver::new(platform)),
            DeviceFamily::BindDns => {
                AnyDriver::BindDns(BindDnsDriver::new(platform, layout.clone()))
            }
        }
    }
}

impl DeviceDriver for AnyDriver {
    fn platform(&self) -> &PlatformDefinition {
        match self {
            AnyDriver::CiscoSwitch(d) => d.platform(),
            AnyDriver::CiscoVepc(d) => d.platform(),
            AnyDriver::EricssonEpg(d) => d.platform(),
            AnyDriver::EricssonMk(d) => d.platform(),
            AnyDriver::BindDns(d) => d.platform(),
        }
    }

    async fn retrieve<S: Session>(
        &self,
        session: &mut S,
        ctx: &RetrieveContext<'_>,
    ) -> Result<Snapshot> {
        match self {
            AnyDriver::CiscoSwitch(d) => d.retrieve(session, ctx).await,
            AnyDriver::CiscoVepc(d) => d.retrieve(session, ctx).await,
            AnyDriver::EricssonEpg(d) => d.retrieve(session, ctx).await,
            AnyDriver::EricssonMk(d) => d.retrieve(session, ctx).await,
            AnyDriver::BindDns(d) => d.retrieve(session, ctx).await,
        }
    }

    async fn check_license<S: Session>(
        &self,
        session: &mut S,
        ctx: &RetrieveContext<'_>,
        license: &LicenseContext<'_>,
    ) -> Result<LicenseStatus> {
        match self {
            AnyDriver::CiscoSwitch(d) => d.check_license(session, ctx, license).await,
            AnyDriver::CiscoVepc(d) => d.check_license(session, ctx, license).await,
            AnyDriver::EricssonEpg(d) => d.check_license(session, ctx, license).await,
            AnyDriver::EricssonMk(d) => d.check_license(session, ctx, license).await,
            AnyDriver::BindDns(d) => d.check_license(session, ctx, license).await,
        }
    }
}

/// Drivers by family, built once per run.
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    drivers: HashMap<DeviceFamily, Arc<AnyDriver>>,
}

impl PlatformRegistry {
    /// Registry with the built-in definition of every family.
    pub fn builtin() -> Self {
        let layout = ZoneLayout::default();
        let drivers = DeviceFamily::ALL
            .into_iter()
            .map(|family| {
                let driver = AnyDriver::new(vendors::platform(family), &layout);
                (family, Arc::new(driver))
            })
            .collect();
        Self { drivers }
    }

    /// Replace the driver of `driver`'s family.
    pub fn register(&mut self, driver: AnyDriver) {
        let family = driver.platform().family;
        self.drivers.insert(family, Arc::new(driver));
    }

    /// Driver for `family`.
    pub fn get(&self, family: DeviceFamily) -> Option<Arc<AnyDriver>> {
        self.drivers.get(&family).cloned()
    }

    /// Registered families.
    pub fn families(&self) -> impl Iterator<Item = DeviceFamily> + '_ {
        self.drivers.keys().copied()
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_builtin_has_every_family() {
        let registry = PlatformRegistry::builtin();
        for family in DeviceFamily::ALL {
            let driver = registry.get(family).unwrap();
            assert_eq!(driver.platform().family, family);
        }
        assert_eq!(registry.families().count(), 5);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = PlatformRegistry::builtin();
        let platform = vendors::cisco_switch::platform().with_timeout(Duration::from_secs(5));
        registry.register(AnyDriver::new(platform, &ZoneLayout::default()));

        let driver = registry.get(DeviceFamily::CiscoSwitch).unwrap();
        assert_eq!(driver.platform().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_license_families() {
        let registry = PlatformRegistry::builtin();
        let licensed: Vec<_> = DeviceFamily::ALL
            .into_iter()
            .filter(|f| registry.get(*f).unwrap().has_license())
            .collect();
        assert_eq!(licensed, vec![DeviceFamily::CiscoVepc]);
    }
}
