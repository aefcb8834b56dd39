//! Core traits for the DNS guard
//!
//! This module defines the abstract interfaces that all backends must follow.
//!
//! - [`ChangeSource`]: Enumerate interfaces and observe configuration changes
//! - [`DnsConfigurator`]: Write an interface's DNS server list

pub mod change_source;
pub mod dns_configurator;

pub use change_source::{ChangeEvent, ChangeSource, ChangeStream, ConfigurationRecord, InterfaceFilter};
pub use dns_configurator::DnsConfigurator;
