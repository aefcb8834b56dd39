//! Test doubles and common utilities for engine contract tests

#![allow(dead_code)]

use dnsguard_core::engine::{ErrorSink, FailureKind, InterfaceFailure};
use dnsguard_core::traits::{ConfigurationRecord, InterfaceFilter};
use dnsguard_core::{DnsEnforcer, EngineConfig, EngineEvent, MemoryHost};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const PRIMARY_ORIGINAL: &str = "192.168.1.1";
pub const SECONDARY_ORIGINAL: &str = "10.0.0.1";

/// Convert a slice of literals into an owned server list
pub fn servers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// The server list enforced by most tests
pub fn desired() -> Vec<String> {
    servers(&["8.8.8.8", "1.1.1.1"])
}

/// Host with two active interfaces:
/// `{idx=1, eth0, 192.168.1.1}` and `{idx=2, eth1, 10.0.0.1}`
pub fn two_interface_host() -> MemoryHost {
    let host = MemoryHost::new();
    host.add_interface(ConfigurationRecord::new(1, "eth0", servers(&[PRIMARY_ORIGINAL])));
    host.add_interface(ConfigurationRecord::new(2, "eth1", servers(&[SECONDARY_ORIGINAL])));
    host
}

/// Build an enforcer backed by `host` for both roles
pub fn enforcer_for(host: &MemoryHost) -> (DnsEnforcer, mpsc::Receiver<EngineEvent>) {
    enforcer_with(host, EngineConfig::default(), InterfaceFilter::default())
}

pub fn enforcer_with(
    host: &MemoryHost,
    config: EngineConfig,
    filter: InterfaceFilter,
) -> (DnsEnforcer, mpsc::Receiver<EngineEvent>) {
    DnsEnforcer::new(
        Arc::new(host.clone()),
        Arc::new(host.clone()),
        config,
        filter,
    )
    .expect("engine construction succeeds")
}

/// A failure as seen by the error sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFailure {
    pub kind: FailureKind,
    pub interface_index: u32,
    pub setting_id: String,
}

/// Error sink that records every failure it receives
#[derive(Default)]
pub struct CollectingSink {
    failures: Mutex<Vec<ReportedFailure>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failures(&self) -> Vec<ReportedFailure> {
        self.failures.lock().unwrap().clone()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, failure: &InterfaceFailure) {
        self.failures.lock().unwrap().push(ReportedFailure {
            kind: failure.kind,
            interface_index: failure.interface_index,
            setting_id: failure.setting_id.clone(),
        });
    }
}

/// Receive events until one matches `predicate`, failing after 5 seconds
pub async fn wait_for_event<F>(events: &mut mpsc::Receiver<EngineEvent>, mut predicate: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;

    match result {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event channel closed before the expected event"),
        Err(_) => panic!("expected event did not arrive within 5 seconds"),
    }
}

/// Drain everything currently buffered in the event channel
pub fn drain(events: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
