//! Configuration types for the DNS guard
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::traits::InterfaceFilter;

/// Main DNS guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsGuardConfig {
    /// DNS servers to enforce, in resolver order
    pub servers: Vec<String>,

    /// Which interfaces are enforced
    #[serde(default)]
    pub filter: InterfaceFilter,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DnsGuardConfig {
    /// Create a new configuration with defaults
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            servers,
            filter: InterfaceFilter::default(),
            backend: BackendConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_servers(&self.servers)?;
        self.backend.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Check a desired server list
///
/// Address syntax is left to the backend; only emptiness is rejected here.
pub fn validate_servers(servers: &[String]) -> Result<(), crate::Error> {
    if servers.is_empty() {
        return Err(crate::Error::config("No DNS servers configured"));
    }

    if servers.iter().any(|s| s.trim().is_empty()) {
        return Err(crate::Error::config("DNS server entries cannot be blank"));
    }

    Ok(())
}

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// systemd-resolved writes with rtnetlink and DNS polling monitors (Linux)
    Resolved {
        /// Path to the resolvectl binary
        #[serde(default = "default_resolvectl")]
        resolvectl: String,
        /// Root of the network class in sysfs
        #[serde(default = "default_sysfs_root")]
        sysfs_root: String,
        /// Seconds between re-reads of every link's DNS servers
        ///
        /// DNS changes made through systemd-resolved produce no rtnetlink
        /// notification, so they are only seen by this poll.
        #[serde(default = "default_dns_poll_secs")]
        dns_poll_secs: u64,
    },

    /// Simulated in-memory host (no system changes)
    Memory,
}

impl BackendConfig {
    /// Validate the backend configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            BackendConfig::Resolved {
                resolvectl,
                sysfs_root,
                dns_poll_secs,
            } => {
                if resolvectl.is_empty() {
                    return Err(crate::Error::config("resolvectl path cannot be empty"));
                }
                if sysfs_root.is_empty() {
                    return Err(crate::Error::config("sysfs root cannot be empty"));
                }
                if *dns_poll_secs == 0 {
                    return Err(crate::Error::config("DNS poll interval must be at least 1 second"));
                }
                Ok(())
            }
            BackendConfig::Memory => Ok(()),
        }
    }

    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            BackendConfig::Resolved { .. } => "resolved",
            BackendConfig::Memory => "memory",
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Resolved {
            resolvectl: default_resolvectl(),
            sysfs_root: default_sysfs_root(),
            dns_poll_secs: default_dns_poll_secs(),
        }
    }
}

fn default_resolvectl() -> String {
    "resolvectl".to_string()
}

fn default_sysfs_root() -> String {
    "/sys/class/net".to_string()
}

fn default_dns_poll_secs() -> u64 {
    5
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Skip re-applying when a change event already reports the desired servers
    ///
    /// Suppresses the echo of the engine's own writes. Original servers are
    /// captured once per interface regardless of this setting.
    #[serde(default = "default_suppress_echo")]
    pub suppress_echo: bool,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            suppress_echo: default_suppress_echo(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_suppress_echo() -> bool {
    true
}
