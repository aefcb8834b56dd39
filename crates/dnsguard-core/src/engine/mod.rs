//! DNS enforcement engine
//!
//! The DnsEnforcer is responsible for:
//! - Capturing the original DNS servers of every active interface
//! - Applying the desired DNS servers to all of them
//! - Re-applying whenever an interface's configuration changes
//! - Restoring the original servers on stop
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ ChangeSource │─── ChangeEvent ───┐
//! └──────────────┘                   │
//!                                    ▼
//!                            ┌──────────────┐
//!                            │  Dispatcher  │
//!                            └──────────────┘
//!                                    │
//!         ┌──────────────────────────┼──────────────────────────┐
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//! ┌───────────────┐        ┌─────────────────┐         ┌─────────────┐
//! │ConfigRegistry │        │ DnsConfigurator │         │   Events    │
//! │  (upsert)     │        │  (apply_one)    │         │  (notify)   │
//! └───────────────┘        └─────────────────┘         └─────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ─start─▶ Collecting ─▶ Enforcing ─▶ Monitoring ─stop─▶ Reverting ─▶ Stopped
//!       ▲                    │                          │                            │
//!       └── enumeration ─────┘                          │                            │
//!       └── subscription failure (after reverting) ─────┘          start again ──────┘
//! ```
//!
//! Changes made to an interface after collection finishes but before the
//! subscription is armed are not observed.

mod dispatcher;
mod enforce;
mod revert;
mod sink;
mod sweep;

pub use enforce::EnforcementController;
pub use revert::ReversionController;
pub use sink::{ErrorSink, FailureKind, InterfaceFailure};
pub use sweep::{EventEmitter, SweepContext, SweepReport};

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, validate_servers};
use crate::error::{Error, Result};
use crate::registry::ConfigRegistry;
use crate::snapshot::Snapshot;
use crate::traits::{ChangeSource, ConfigurationRecord, DnsConfigurator, InterfaceFilter};
use dispatcher::{Dispatcher, Monitor};

/// Events emitted by the DnsEnforcer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Enforcement is live
    Started {
        interfaces: usize,
        enforced: usize,
        failed: usize,
    },

    /// An interface was seen for the first time
    InterfaceCaptured {
        interface_index: u32,
        original_dns_servers: Vec<String>,
    },

    /// Desired servers written to an interface
    Enforced { interface_index: u32 },

    /// Change event already reported the desired servers
    EnforceSkipped { interface_index: u32 },

    /// Writing the desired servers failed
    EnforceFailed { interface_index: u32, error: String },

    /// Original servers written back to an interface
    Reverted { interface_index: u32 },

    /// Writing the original servers failed
    RevertFailed { interface_index: u32, error: String },

    /// Change subscription armed
    MonitoringArmed,

    /// Change subscription disarmed, no further changes dispatched
    MonitoringDisarmed,

    /// Reversion finished
    Stopped { reverted: usize, failed: usize },
}

/// Lifecycle state of the DnsEnforcer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Collecting,
    Enforcing,
    Monitoring,
    Reverting,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Collecting => "collecting",
            EngineState::Enforcing => "enforcing",
            EngineState::Monitoring => "monitoring",
            EngineState::Reverting => "reverting",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// One start..stop cycle
struct Session {
    registry: Arc<ConfigRegistry>,
    enforcement: Arc<EnforcementController>,
    reversion: ReversionController,
    monitor: Option<Monitor>,
}

/// Core DNS enforcement engine
///
/// ## Lifecycle
///
/// 1. Create with [`DnsEnforcer::new()`]
/// 2. [`DnsEnforcer::start()`] captures, enforces and arms monitoring
/// 3. [`DnsEnforcer::stop()`] disarms monitoring and reverts
/// 4. Optionally start again
///
/// ## Threading
///
/// `start` and `stop` run on the caller's task. Change events are handled on
/// a dispatcher task spawned by `start`, concurrently with the caller.
pub struct DnsEnforcer {
    source: Arc<dyn ChangeSource>,
    configurator: Arc<dyn DnsConfigurator>,
    filter: InterfaceFilter,
    suppress_echo: bool,
    events: EventEmitter,
    state: EngineState,
    session: Option<Session>,
}

impl DnsEnforcer {
    /// Create a new enforcer
    ///
    /// # Returns
    ///
    /// A tuple of (enforcer, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Arc<dyn ChangeSource>,
        configurator: Arc<dyn DnsConfigurator>,
        config: EngineConfig,
        filter: InterfaceFilter,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let enforcer = Self {
            source,
            configurator,
            filter,
            suppress_echo: config.suppress_echo,
            events: EventEmitter::new(tx),
            state: EngineState::Uninitialized,
            session: None,
        };

        Ok((enforcer, rx))
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Servers being enforced by the current session
    pub fn desired_servers(&self) -> Option<&[String]> {
        self.session
            .as_ref()
            .map(|session| session.enforcement.desired())
    }

    /// Point-in-time copy of every tracked snapshot
    pub async fn tracked_interfaces(&self) -> Vec<Snapshot> {
        let Some(session) = &self.session else {
            return Vec::new();
        };

        let mut tracked = Vec::new();
        session.registry.lock().await.for_each(|snapshot| {
            tracked.push(snapshot.clone());
            true
        });
        tracked
    }

    /// Capture, enforce and start monitoring
    ///
    /// # Returns
    ///
    /// - `Ok(SweepReport)`: monitoring is armed; the report covers the initial
    ///   enforcement sweep (per-interface failures do not fail `start`)
    /// - `Err(Error::Enumeration)`: interfaces could not be listed; nothing was changed
    /// - `Err(Error::Subscription)`: monitoring could not be armed; everything
    ///   already applied has been reverted
    pub async fn start(
        &mut self,
        desired: Vec<String>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Result<SweepReport> {
        if !matches!(self.state, EngineState::Uninitialized | EngineState::Stopped) {
            return Err(Error::invalid_state(format!("cannot start while {}", self.state)));
        }
        validate_servers(&desired)?;

        let registry = Arc::new(ConfigRegistry::new());
        let ctx = Arc::new(
            SweepContext::new(
                Arc::clone(&registry),
                Arc::clone(&self.source),
                Arc::clone(&self.configurator),
                error_sink,
            )
            .with_events(self.events.clone()),
        );
        let enforcement = Arc::new(EnforcementController::new(Arc::clone(&ctx), desired));
        let reversion = ReversionController::new(Arc::clone(&ctx));

        self.transition(EngineState::Collecting);
        let records = match self.source.enumerate(&self.filter).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to enumerate interfaces: {}", e);
                self.transition(EngineState::Uninitialized);
                return Err(as_enumeration(e));
            }
        };
        self.collect(&registry, records).await;

        self.transition(EngineState::Enforcing);
        let report = enforcement.apply_all().await;

        let changes = match self.source.subscribe(&self.filter).await {
            Ok(changes) => changes,
            Err(e) => {
                error!("Failed to arm change monitoring: {}", e);
                self.transition(EngineState::Reverting);
                reversion.revert_all().await;
                self.transition(EngineState::Uninitialized);
                return Err(as_subscription(e));
            }
        };

        let monitor = Dispatcher::new(
            Arc::clone(&ctx),
            Arc::clone(&enforcement),
            self.filter.clone(),
            self.suppress_echo,
        )
        .spawn(changes);

        let interfaces = registry.len().await;
        self.session = Some(Session {
            registry,
            enforcement,
            reversion,
            monitor: Some(monitor),
        });
        self.transition(EngineState::Monitoring);

        self.events.emit(EngineEvent::MonitoringArmed);
        self.events.emit(EngineEvent::Started {
            interfaces,
            enforced: report.succeeded,
            failed: report.failed,
        });
        info!(
            "Monitoring {} interface(s) via {}",
            interfaces,
            self.source.source_name()
        );

        Ok(report)
    }

    /// Disarm monitoring and restore every tracked interface
    ///
    /// Monitoring is fully disarmed before reversion begins.
    pub async fn stop(&mut self) -> Result<SweepReport> {
        if self.state != EngineState::Monitoring {
            return Err(Error::invalid_state(format!("cannot stop while {}", self.state)));
        }
        let Some(mut session) = self.session.take() else {
            return Err(Error::invalid_state("no active session"));
        };

        self.transition(EngineState::Reverting);
        if let Some(monitor) = session.monitor.take() {
            monitor.disarm().await;
        }
        self.events.emit(EngineEvent::MonitoringDisarmed);

        let report = session.reversion.revert_all().await;

        self.transition(EngineState::Stopped);
        self.events.emit(EngineEvent::Stopped {
            reverted: report.succeeded,
            failed: report.failed,
        });

        Ok(report)
    }

    async fn collect(&self, registry: &ConfigRegistry, records: Vec<ConfigurationRecord>) {
        let mut guard = registry.lock().await;

        for record in records {
            if !self.filter.matches(&record) {
                debug!("Skipping filtered interface {} ({})", record.interface_index, record.setting_id);
                continue;
            }

            match Snapshot::capture(&record) {
                Ok(snapshot) => {
                    debug!(
                        "Captured interface {} ({}), original DNS servers {:?}",
                        record.interface_index, record.setting_id, record.dns_servers
                    );
                    self.events.emit(EngineEvent::InterfaceCaptured {
                        interface_index: snapshot.interface_index(),
                        original_dns_servers: snapshot.original_dns_servers().to_vec(),
                    });
                    guard.upsert(snapshot);
                }
                Err(e) => warn!("Skipping interface during collection: {}", e),
            }
        }

        info!("Collected {} interface configuration(s)", guard.len());
    }

    fn transition(&mut self, next: EngineState) {
        debug!("Engine state {} -> {}", self.state, next);
        self.state = next;
    }
}

impl Drop for DnsEnforcer {
    fn drop(&mut self) {
        if self.state == EngineState::Monitoring {
            // The monitor aborts the dispatcher as the session drops
            warn!("DnsEnforcer dropped while monitoring; DNS settings were not reverted");
        }
    }
}

fn as_enumeration(e: Error) -> Error {
    match e {
        Error::Enumeration(_) => e,
        other => Error::enumeration(other.to_string()),
    }
}

fn as_subscription(e: Error) -> Error {
    match e {
        Error::Subscription(_) => e,
        other => Error::subscription(other.to_string()),
    }
}
