// # Memory Host
//
// In-memory network host implementing both ChangeSource and DnsConfigurator.
//
// ## Purpose
//
// Simulates a machine's interface table so the engine can run without
// touching real network configuration. Useful for embedding, demos and
// tests.
//
// ## Behavior
//
// - Writes replace the interface's server list in the table
// - Outside changes (`set_external`) are pushed to every live subscription
// - Writes are not echoed back as change events unless `set_echo_writes(true)`
// - Failures can be injected per interface, for enumeration and for subscribe

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::Error;
use crate::traits::{
    ChangeEvent, ChangeSource, ChangeStream, ConfigurationRecord, DnsConfigurator, InterfaceFilter,
};

/// One DNS write observed by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub interface_index: u32,
    pub servers: Vec<String>,
    /// Live subscriptions at the moment of the write
    pub active_subscriptions: usize,
}

struct Subscriber {
    filter: InterfaceFilter,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct HostState {
    interfaces: BTreeMap<u32, ConfigurationRecord>,
    subscribers: Vec<Subscriber>,
    writes: Vec<WriteRecord>,
    failing_writes: HashSet<u32>,
    fail_enumeration: bool,
    fail_subscription: bool,
    echo_writes: bool,
}

impl HostState {
    fn active_subscriptions(&self) -> usize {
        self.subscribers.iter().filter(|s| !s.tx.is_closed()).count()
    }

    fn notify(&mut self, record: &ConfigurationRecord) {
        self.subscribers.retain(|s| !s.tx.is_closed());

        for subscriber in &self.subscribers {
            if subscriber.filter.matches(record) {
                // Receiver may close between retain and send
                let _ = subscriber.tx.send(ChangeEvent::new(record.clone()));
            }
        }
    }
}

/// In-memory host implementation
///
/// Clones share the same interface table.
///
/// # Example
///
/// ```rust
/// use dnsguard_core::source::MemoryHost;
/// use dnsguard_core::traits::ConfigurationRecord;
///
/// let host = MemoryHost::new();
/// host.add_interface(ConfigurationRecord::new(
///     2,
///     "eth0",
///     vec!["192.168.1.1".to_string()],
/// ));
///
/// assert_eq!(host.dns_servers(2), Some(vec!["192.168.1.1".to_string()]));
/// ```
#[derive(Clone, Default)]
pub struct MemoryHost {
    inner: Arc<Mutex<HostState>>,
}

impl MemoryHost {
    /// Create a host with no interfaces
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace an interface without notifying subscribers
    pub fn add_interface(&self, record: ConfigurationRecord) {
        self.state().interfaces.insert(record.interface_index, record);
    }

    /// Remove an interface, returning its last record
    pub fn remove_interface(&self, interface_index: u32) -> Option<ConfigurationRecord> {
        self.state().interfaces.remove(&interface_index)
    }

    /// Current DNS servers of an interface
    pub fn dns_servers(&self, interface_index: u32) -> Option<Vec<String>> {
        self.state()
            .interfaces
            .get(&interface_index)
            .map(|record| record.dns_servers.clone())
    }

    /// Change an interface's servers from outside the engine and notify subscribers
    ///
    /// Returns `false` if the interface does not exist.
    pub fn set_external(&self, interface_index: u32, servers: Vec<String>) -> bool {
        let mut state = self.state();
        let Some(record) = state.interfaces.get_mut(&interface_index) else {
            return false;
        };

        record.dns_servers = servers;
        let record = record.clone();
        state.notify(&record);
        true
    }

    /// Plug in an interface and notify subscribers, as a hot-plugged adapter would
    pub fn plug(&self, record: ConfigurationRecord) {
        let mut state = self.state();
        state.interfaces.insert(record.interface_index, record.clone());
        state.notify(&record);
    }

    /// Deliver an arbitrary record to subscribers without touching the table
    pub fn emit_raw(&self, record: ConfigurationRecord) {
        self.state().notify(&record);
    }

    /// Re-send an interface's current state to subscribers
    pub fn notify(&self, interface_index: u32) {
        let mut state = self.state();
        if let Some(record) = state.interfaces.get(&interface_index).cloned() {
            state.notify(&record);
        }
    }

    /// Make every write to `interface_index` fail
    pub fn fail_writes_for(&self, interface_index: u32) {
        self.state().failing_writes.insert(interface_index);
    }

    /// Let writes to `interface_index` succeed again
    pub fn restore_writes_for(&self, interface_index: u32) {
        self.state().failing_writes.remove(&interface_index);
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.state().fail_enumeration = fail;
    }

    pub fn fail_subscription(&self, fail: bool) {
        self.state().fail_subscription = fail;
    }

    /// Report each successful write back to subscribers as a change
    pub fn set_echo_writes(&self, echo: bool) {
        self.state().echo_writes = echo;
    }

    /// Every write observed so far, in order
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state().writes.clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    /// Number of subscriptions whose stream is still alive
    pub fn active_subscriptions(&self) -> usize {
        self.state().active_subscriptions()
    }
}

#[async_trait]
impl ChangeSource for MemoryHost {
    async fn enumerate(&self, filter: &InterfaceFilter) -> Result<Vec<ConfigurationRecord>, Error> {
        let state = self.state();
        if state.fail_enumeration {
            return Err(Error::enumeration("memory host enumeration disabled"));
        }

        Ok(state
            .interfaces
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn lookup(&self, setting_id: &str) -> Result<Option<ConfigurationRecord>, Error> {
        Ok(self
            .state()
            .interfaces
            .values()
            .find(|record| record.setting_id == setting_id)
            .cloned())
    }

    async fn subscribe(&self, filter: &InterfaceFilter) -> Result<ChangeStream, Error> {
        let mut state = self.state();
        if state.fail_subscription {
            return Err(Error::subscription("memory host subscription disabled"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber {
            filter: filter.clone(),
            tx,
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    fn source_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl DnsConfigurator for MemoryHost {
    async fn set_dns_servers(
        &self,
        target: &ConfigurationRecord,
        servers: &[String],
    ) -> Result<(), Error> {
        let mut state = self.state();
        let index = target.interface_index;

        if state.failing_writes.contains(&index) {
            return Err(Error::backend(
                "memory",
                format!("write to interface {} rejected", index),
            ));
        }

        let active_subscriptions = state.active_subscriptions();
        let Some(record) = state.interfaces.get_mut(&index) else {
            return Err(Error::interface_not_found(format!("interface {}", index)));
        };

        record.dns_servers = servers.to_vec();
        let record = record.clone();

        state.writes.push(WriteRecord {
            interface_index: index,
            servers: servers.to_vec(),
            active_subscriptions,
        });

        if state.echo_writes {
            state.notify(&record);
        }

        Ok(())
    }

    fn configurator_name(&self) -> &'static str {
        "memory"
    }
}
