// # systemd-resolved Backend
//
// This crate provides the Linux backend for the DNS guard:
//
// - **Enumeration**: links from sysfs, DNS servers from `resolvectl dns`
// - **Monitoring**: rtnetlink RTM_NEWLINK notifications (link up/down, new
//   links) merged with a periodic re-read of every link's DNS servers
// - **Writes**: `resolvectl dns` / `resolvectl revert`
//
// ## Identity
//
// The setting id of a link is its interface name. A renamed link is looked
// up by its new name on the next change event.
//
// ## Platform Support
//
// rtnetlink monitoring is only available on Linux. On other platforms the
// change stream carries the DNS poll alone.

mod poll;
mod resolvectl;
mod sysfs;

#[cfg(test)]
mod fixture;

#[cfg(target_os = "linux")]
mod monitor;

pub use resolvectl::{Resolvectl, parse_dns_output};
pub use sysfs::{SysfsLink, SysfsReader};

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use dnsguard_core::config::BackendConfig;
use dnsguard_core::traits::{
    ChangeSource, ChangeStream, ConfigurationRecord, DnsConfigurator, InterfaceFilter,
};
use dnsguard_core::{Error, Result};

/// systemd-resolved change source and DNS configurator
#[derive(Debug, Clone)]
pub struct ResolvedBackend {
    resolvectl: Resolvectl,
    sysfs: SysfsReader,
    dns_poll: Duration,
}

/// Default interval between DNS re-reads
const DEFAULT_DNS_POLL: Duration = Duration::from_secs(5);

impl ResolvedBackend {
    pub fn new(resolvectl: impl Into<String>, sysfs_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            resolvectl: Resolvectl::new(resolvectl),
            sysfs: SysfsReader::new(sysfs_root),
            dns_poll: DEFAULT_DNS_POLL,
        }
    }

    /// Set the interval between DNS re-reads of every link
    pub fn with_dns_poll(mut self, interval: Duration) -> Self {
        self.dns_poll = interval;
        self
    }

    /// Build the backend from a `BackendConfig::Resolved`
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        match config {
            BackendConfig::Resolved {
                resolvectl,
                sysfs_root,
                dns_poll_secs,
            } => Ok(Self::new(resolvectl.clone(), sysfs_root.clone())
                .with_dns_poll(Duration::from_secs(*dns_poll_secs))),
            other => Err(Error::config(format!(
                "resolved backend cannot be built from '{}' config",
                other.type_name()
            ))),
        }
    }

    async fn record_for(&self, link: SysfsLink) -> Result<ConfigurationRecord> {
        let dns_servers = self.resolvectl.dns(&link.name).await?;

        Ok(ConfigurationRecord::new(link.index, link.name, dns_servers).with_ip_enabled(link.up))
    }

    /// Live record of every non-loopback link, unfiltered
    pub(crate) async fn records(&self) -> Result<Vec<ConfigurationRecord>> {
        let mut records = Vec::new();
        for link in self.sysfs.links().await? {
            records.push(self.record_for(link).await?);
        }
        Ok(records)
    }

    /// Read the live record of the link with `index`
    pub async fn record_by_index(&self, index: u32) -> Result<Option<ConfigurationRecord>> {
        match self.sysfs.link_by_index(index).await? {
            Some(link) => self.record_for(link).await.map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChangeSource for ResolvedBackend {
    async fn enumerate(&self, filter: &InterfaceFilter) -> Result<Vec<ConfigurationRecord>> {
        let records = self.records().await.map_err(|e| match e {
            Error::Enumeration(_) => e,
            other => Error::enumeration(format!("cannot read DNS configuration: {}", other)),
        })?;

        Ok(records
            .into_iter()
            .filter(|record| {
                let matches = filter.matches(record);
                if !matches {
                    debug!("Link {} ({}) filtered out", record.interface_index, record.setting_id);
                }
                matches
            })
            .collect())
    }

    async fn lookup(&self, setting_id: &str) -> Result<Option<ConfigurationRecord>> {
        match self.sysfs.link(setting_id).await? {
            Some(link) => self.record_for(link).await.map(Some),
            None => Ok(None),
        }
    }

    #[cfg(target_os = "linux")]
    async fn subscribe(&self, filter: &InterfaceFilter) -> Result<ChangeStream> {
        use tokio_stream::StreamExt;

        let links = monitor::subscribe(self.clone(), filter.clone())?;
        let polled = poll::subscribe(self.clone(), filter.clone(), self.dns_poll);

        Ok(Box::pin(links.merge(polled)))
    }

    #[cfg(not(target_os = "linux"))]
    async fn subscribe(&self, filter: &InterfaceFilter) -> Result<ChangeStream> {
        Ok(poll::subscribe(self.clone(), filter.clone(), self.dns_poll))
    }

    fn source_name(&self) -> &'static str {
        "resolved"
    }
}

#[async_trait]
impl DnsConfigurator for ResolvedBackend {
    async fn set_dns_servers(&self, target: &ConfigurationRecord, servers: &[String]) -> Result<()> {
        if servers.is_empty() {
            self.resolvectl.revert(&target.setting_id).await
        } else {
            self.resolvectl.set_dns(&target.setting_id, servers).await
        }
    }

    fn configurator_name(&self) -> &'static str {
        "resolved"
    }
}
