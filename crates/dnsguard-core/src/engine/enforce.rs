//! Enforcement controller
//!
//! Writes the desired DNS server list to tracked interfaces, either as a
//! full sweep of the registry or for a single interface after a change.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::EngineEvent;
use super::sink::FailureKind;
use super::sweep::{SweepContext, SweepReport};
use crate::snapshot::Snapshot;

/// Applies the desired DNS servers to live interfaces
pub struct EnforcementController {
    ctx: Arc<SweepContext>,
    desired: Arc<[String]>,
}

impl EnforcementController {
    pub fn new(ctx: Arc<SweepContext>, desired: Vec<String>) -> Self {
        Self {
            ctx,
            desired: desired.into(),
        }
    }

    /// The servers this controller enforces
    pub fn desired(&self) -> &[String] {
        &self.desired
    }

    /// Apply the desired servers to every tracked interface
    ///
    /// Holds the registry lock for the whole sweep so it observes one
    /// consistent set of snapshots. A failure on one interface is reported
    /// to the error sink and the sweep moves on to the next interface.
    pub async fn apply_all(&self) -> SweepReport {
        let guard = self.ctx.registry.lock().await;
        let swept = guard
            .fold_async(SweepReport::default(), move |mut report, snapshot| async move {
                report.record(self.enforce(&snapshot).await);
                ControlFlow::Continue(report)
            })
            .await;
        drop(guard);

        let report = match swept {
            ControlFlow::Continue(report) | ControlFlow::Break(report) => report,
        };

        info!(
            "Enforced {:?} on {} interface(s), {} failed",
            self.desired, report.succeeded, report.failed
        );
        report
    }

    /// Apply the desired servers to one tracked interface
    ///
    /// Takes the registry lock for this interface only. An index that is not
    /// tracked counts as a failure but is not reported to the error sink,
    /// since there is no snapshot to describe it.
    pub async fn apply_one(&self, interface_index: u32) -> SweepReport {
        let guard = self.ctx.registry.lock().await;
        let mut report = SweepReport::default();

        match guard.get(interface_index) {
            Some(snapshot) => report.record(self.enforce(&snapshot).await),
            None => {
                warn!("Interface {} is not tracked, nothing to enforce", interface_index);
                report.record(false);
            }
        }

        report
    }

    async fn enforce(&self, snapshot: &Snapshot) -> bool {
        debug!(
            "Overriding DNS settings for interface {} ({})",
            snapshot.interface_index(),
            snapshot.setting_id()
        );

        match self.ctx.write_servers(snapshot, &self.desired).await {
            Ok(()) => {
                self.ctx.events.emit(EngineEvent::Enforced {
                    interface_index: snapshot.interface_index(),
                });
                true
            }
            Err(e) => {
                self.ctx.events.emit(EngineEvent::EnforceFailed {
                    interface_index: snapshot.interface_index(),
                    error: e.to_string(),
                });
                self.ctx.report_failure(FailureKind::Apply, snapshot, e);
                false
            }
        }
    }
}
