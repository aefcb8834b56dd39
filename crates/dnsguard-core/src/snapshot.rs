//! Configuration snapshots
//!
//! A [`Snapshot`] records the identity of one interface together with the
//! DNS servers it had before enforcement began. Snapshots are never mutated;
//! a changed interface yields a successor snapshot that replaces the old one
//! in the registry.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::traits::ConfigurationRecord;

/// Captured, immutable record of one interface's original DNS configuration
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    interface_index: u32,
    setting_id: String,
    original_dns_servers: Vec<String>,
    captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Capture a snapshot from a freshly reported record
    ///
    /// The record's current DNS servers become the original servers.
    pub fn capture(record: &ConfigurationRecord) -> Result<Self> {
        validate(record)?;

        Ok(Self {
            interface_index: record.interface_index,
            setting_id: record.setting_id.clone(),
            original_dns_servers: record.dns_servers.clone(),
            captured_at: Utc::now(),
        })
    }

    /// Build the snapshot that replaces `self` after the interface changed
    ///
    /// Identity is refreshed from `record`; the original DNS servers and the
    /// capture time are carried forward so the interface is reverted to what
    /// it had before it was first seen.
    pub fn succeed(&self, record: &ConfigurationRecord) -> Result<Self> {
        validate(record)?;

        if record.interface_index != self.interface_index {
            return Err(Error::snapshot_build(format!(
                "record for interface {} cannot replace snapshot of interface {}",
                record.interface_index, self.interface_index
            )));
        }

        Ok(Self {
            interface_index: self.interface_index,
            setting_id: record.setting_id.clone(),
            original_dns_servers: self.original_dns_servers.clone(),
            captured_at: self.captured_at,
        })
    }

    pub fn interface_index(&self) -> u32 {
        self.interface_index
    }

    pub fn setting_id(&self) -> &str {
        &self.setting_id
    }

    /// DNS servers to restore on reversion (empty means automatic)
    pub fn original_dns_servers(&self) -> &[String] {
        &self.original_dns_servers
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

fn validate(record: &ConfigurationRecord) -> Result<()> {
    if record.interface_index == 0 {
        return Err(Error::snapshot_build(format!(
            "interface index 0 is not a valid identity (setting id '{}')",
            record.setting_id
        )));
    }

    if record.setting_id.trim().is_empty() {
        return Err(Error::snapshot_build(format!(
            "interface {} reported an empty setting id",
            record.interface_index
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u32, id: &str, servers: &[&str]) -> ConfigurationRecord {
        ConfigurationRecord::new(index, id, servers.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_capture_takes_current_servers() {
        let snapshot = Snapshot::capture(&record(3, "{A1}", &["192.168.1.1"])).unwrap();

        assert_eq!(snapshot.interface_index(), 3);
        assert_eq!(snapshot.setting_id(), "{A1}");
        assert_eq!(snapshot.original_dns_servers(), ["192.168.1.1"]);
    }

    #[test]
    fn test_capture_rejects_malformed_records() {
        assert!(matches!(
            Snapshot::capture(&record(0, "{A1}", &[])),
            Err(Error::SnapshotBuild(_))
        ));
        assert!(matches!(
            Snapshot::capture(&record(4, "  ", &[])),
            Err(Error::SnapshotBuild(_))
        ));
    }

    #[test]
    fn test_successor_keeps_originals() {
        let first = Snapshot::capture(&record(1, "{A1}", &["192.168.1.1"])).unwrap();
        let next = first
            .succeed(&record(1, "{A2}", &["8.8.8.8", "1.1.1.1"]))
            .unwrap();

        assert_eq!(next.setting_id(), "{A2}");
        assert_eq!(next.original_dns_servers(), ["192.168.1.1"]);
        assert_eq!(next.captured_at(), first.captured_at());
        // the predecessor is untouched
        assert_eq!(first.setting_id(), "{A1}");
    }

    #[test]
    fn test_successor_must_match_interface() {
        let first = Snapshot::capture(&record(1, "{A1}", &[])).unwrap();
        assert!(first.succeed(&record(2, "{B1}", &[])).is_err());
    }
}
