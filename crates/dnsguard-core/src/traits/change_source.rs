// # Change Source Trait
//
// Defines the interface for enumerating network interfaces and observing
// changes to their configuration.
//
// ## Implementations
//
// - In-memory: `dnsguard_core::source::MemoryHost`
// - systemd-resolved + rtnetlink (Linux): `dnsguard-resolved` crate
//
// ## Usage
//
// ```rust,ignore
// use dnsguard_core::traits::{ChangeSource, InterfaceFilter};
// use tokio_stream::StreamExt;
//
// let source = /* ChangeSource implementation */;
// let filter = InterfaceFilter::default();
//
// for record in source.enumerate(&filter).await? {
//     println!("{} -> {:?}", record.setting_id, record.dns_servers);
// }
//
// let mut changes = source.subscribe(&filter).await?;
// while let Some(event) = changes.next().await {
//     println!("changed: {:?}", event.record);
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Live configuration of one network interface as reported by a change source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    /// Interface index, stable for the lifetime of the interface
    pub interface_index: u32,
    /// Opaque identity used to re-query the interface's live configuration
    pub setting_id: String,
    /// Currently configured DNS servers, in resolver order
    pub dns_servers: Vec<String>,
    /// Whether IP is enabled (the interface is active)
    pub ip_enabled: bool,
}

impl ConfigurationRecord {
    /// Create a record for an active interface
    pub fn new(
        interface_index: u32,
        setting_id: impl Into<String>,
        dns_servers: Vec<String>,
    ) -> Self {
        Self {
            interface_index,
            setting_id: setting_id.into(),
            dns_servers,
            ip_enabled: true,
        }
    }

    /// Mark the interface as active or inactive
    pub fn with_ip_enabled(mut self, ip_enabled: bool) -> Self {
        self.ip_enabled = ip_enabled;
        self
    }
}

/// A configuration-changed notification delivered by a change source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Freshly reported state of the changed interface
    pub record: ConfigurationRecord,
    /// When the source observed the change
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create a new change event observed now
    pub fn new(record: ConfigurationRecord) -> Self {
        Self {
            record,
            observed_at: Utc::now(),
        }
    }
}

/// Stream of change events produced by [`ChangeSource::subscribe`]
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send + 'static>>;

/// Predicate selecting which interfaces are enforced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceFilter {
    /// Only consider interfaces that have IP enabled
    #[serde(default = "default_ip_enabled_only")]
    pub ip_enabled_only: bool,

    /// Setting ids that are never touched
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl InterfaceFilter {
    /// Check whether a record passes the filter
    pub fn matches(&self, record: &ConfigurationRecord) -> bool {
        if self.ip_enabled_only && !record.ip_enabled {
            return false;
        }

        !self.exclude.iter().any(|id| id == &record.setting_id)
    }

    /// Exclude an interface by setting id
    pub fn excluding(mut self, setting_id: impl Into<String>) -> Self {
        self.exclude.push(setting_id.into());
        self
    }
}

impl Default for InterfaceFilter {
    fn default() -> Self {
        Self {
            ip_enabled_only: default_ip_enabled_only(),
            exclude: Vec::new(),
        }
    }
}

fn default_ip_enabled_only() -> bool {
    true
}

/// Trait for change source implementations
///
/// A change source provides three capabilities:
/// 1. **enumerate()**: one-shot query of every interface matching a filter
/// 2. **lookup()**: re-query one interface's live configuration by setting id
/// 3. **subscribe()**: stream of configuration-changed events
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform platform-specific I/O (netlink, sysfs, management APIs)
/// - ⚠️ Spawn tasks ONLY to pump notifications into the returned stream
///
/// ## Forbidden Capabilities
/// - ❌ Write DNS settings (use `DnsConfigurator`)
/// - ❌ Access the configuration registry (owned by `DnsEnforcer`)
/// - ❌ Decide whether an interface needs enforcement
///
/// ## Unsubscribing
///
/// Dropping the stream returned by `subscribe()` is the disarm primitive.
/// Once the stream is dropped the implementation must stop producing and
/// release every resource tied to the subscription. The engine only drops
/// the stream after its dispatcher has fully exited, so no notification is
/// processed after disarm returns.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Enumerate every interface currently matching `filter`
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<ConfigurationRecord>)`: matching interfaces (possibly empty)
    /// - `Err(Error)`: the source could not be queried at all
    async fn enumerate(
        &self,
        filter: &InterfaceFilter,
    ) -> Result<Vec<ConfigurationRecord>, crate::Error>;

    /// Re-query the live configuration of one interface
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: the interface's current configuration
    /// - `Ok(None)`: no interface with this setting id exists anymore
    /// - `Err(Error)`: the query failed
    async fn lookup(&self, setting_id: &str) -> Result<Option<ConfigurationRecord>, crate::Error>;

    /// Arm change monitoring for interfaces matching `filter`
    ///
    /// # Behavior
    ///
    /// - Events for one interface are delivered in the order they occurred
    /// - No ordering is guaranteed across interfaces
    /// - Must be cancellation-safe (dropping the stream cleans up resources)
    async fn subscribe(&self, filter: &InterfaceFilter) -> Result<ChangeStream, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
