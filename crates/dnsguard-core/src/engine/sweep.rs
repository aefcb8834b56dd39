//! Shared plumbing for enforcement and reversion sweeps

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, warn};

use super::EngineEvent;
use super::sink::{ErrorSink, FailureKind, InterfaceFailure};
use crate::error::{Error, Result};
use crate::registry::ConfigRegistry;
use crate::snapshot::Snapshot;
use crate::traits::{ChangeSource, DnsConfigurator};

/// Outcome counts of a sweep (or of a single-interface operation)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Interfaces written successfully
    pub succeeded: usize,
    /// Interfaces whose write failed
    pub failed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// True if no interface failed
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    pub(crate) fn record(&mut self, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Sender side of the engine event channel
///
/// Events are dropped with a warning when the channel is full.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    tx: Option<mpsc::Sender<EngineEvent>>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// An emitter that drops every event
    pub fn discard() -> Self {
        Self::default()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(TrySendError::Full(event)) = tx.try_send(event) {
            // Event processing is slower than event generation
            warn!(
                "Event channel full, dropping event {:?}. Consider increasing event_channel_capacity.",
                event
            );
        }
    }
}

/// Collaborators shared by every controller of one enforcement session
pub struct SweepContext {
    pub(crate) registry: Arc<ConfigRegistry>,
    pub(crate) source: Arc<dyn ChangeSource>,
    pub(crate) configurator: Arc<dyn DnsConfigurator>,
    pub(crate) sink: Arc<dyn ErrorSink>,
    pub(crate) events: EventEmitter,
}

impl SweepContext {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        source: Arc<dyn ChangeSource>,
        configurator: Arc<dyn DnsConfigurator>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            registry,
            source,
            configurator,
            sink,
            events: EventEmitter::discard(),
        }
    }

    /// Send engine events to `events`
    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    /// Re-query the snapshot's live configuration and write `servers` to it
    pub(crate) async fn write_servers(&self, snapshot: &Snapshot, servers: &[String]) -> Result<()> {
        let live = self
            .source
            .lookup(snapshot.setting_id())
            .await?
            .ok_or_else(|| {
                Error::interface_not_found(format!(
                    "no live configuration for setting id '{}'",
                    snapshot.setting_id()
                ))
            })?;

        self.configurator.set_dns_servers(&live, servers).await
    }

    /// Log a per-interface failure and hand it to the error sink
    pub(crate) fn report_failure(&self, kind: FailureKind, snapshot: &Snapshot, error: Error) {
        let failure = InterfaceFailure {
            kind,
            interface_index: snapshot.interface_index(),
            setting_id: snapshot.setting_id().to_string(),
            error,
        };

        error!("{}", failure);
        self.sink.report(&failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let mut report = SweepReport::default();
        report.record(true);
        report.record(false);
        report.record(true);

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total(), 3);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_full_channel_drops_events() {
        let (tx, mut rx) = mpsc::channel(1);
        let emitter = EventEmitter::new(tx);

        emitter.emit(EngineEvent::MonitoringArmed);
        emitter.emit(EngineEvent::MonitoringDisarmed);

        assert_eq!(rx.recv().await, Some(EngineEvent::MonitoringArmed));
        assert!(rx.try_recv().is_err());
    }
}
