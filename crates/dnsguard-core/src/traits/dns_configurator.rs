// # DNS Configurator Trait
//
// Defines the single mutating primitive the engine calls against live
// interfaces: replacing an interface's DNS server list.

use async_trait::async_trait;

use super::change_source::ConfigurationRecord;

/// Trait for DNS configurator implementations
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform the platform call that writes one interface's DNS servers
/// - ✅ Return success or failure (the engine records failures)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic (a failed write is reported, not retried)
/// - ❌ Access the configuration registry
/// - ❌ Decide whether a write is needed
///
/// # Timeouts
///
/// The engine applies no timeout to individual writes. A hung write blocks
/// the sweep that issued it.
#[async_trait]
pub trait DnsConfigurator: Send + Sync {
    /// Replace the DNS server list of a live interface
    ///
    /// # Parameters
    ///
    /// - `target`: Freshly queried configuration of the interface
    /// - `servers`: Ordered server list; an empty list returns the interface
    ///   to automatic (DHCP or link-default) DNS configuration
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The write was accepted
    /// - `Err(Error)`: The write was rejected or failed
    async fn set_dns_servers(
        &self,
        target: &ConfigurationRecord,
        servers: &[String],
    ) -> Result<(), crate::Error>;

    /// Get the configurator name (for logging/debugging)
    fn configurator_name(&self) -> &'static str;
}
