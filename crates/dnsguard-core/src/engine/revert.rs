//! Reversion controller

use std::sync::Arc;

use tracing::{debug, info};

use super::EngineEvent;
use super::sink::FailureKind;
use super::sweep::{SweepContext, SweepReport};

/// Restores every tracked interface's original DNS servers
pub struct ReversionController {
    ctx: Arc<SweepContext>,
}

impl ReversionController {
    pub fn new(ctx: Arc<SweepContext>) -> Self {
        Self { ctx }
    }

    /// Write each snapshot's original servers back to its interface
    ///
    /// Precondition: monitoring has been disarmed, so nothing else writes
    /// the registry. The sweep works from a point-in-time copy and does not
    /// hold the registry lock while writing. A failed interface is reported
    /// and the sweep continues.
    pub async fn revert_all(&self) -> SweepReport {
        let snapshots = self.ctx.registry.snapshots().await;
        let mut report = SweepReport::default();

        for snapshot in snapshots {
            debug!(
                "Reverting DNS settings for interface {} ({}) to {:?}",
                snapshot.interface_index(),
                snapshot.setting_id(),
                snapshot.original_dns_servers()
            );

            let outcome = self
                .ctx
                .write_servers(&snapshot, snapshot.original_dns_servers())
                .await;
            report.record(outcome.is_ok());

            match outcome {
                Ok(()) => self.ctx.events.emit(EngineEvent::Reverted {
                    interface_index: snapshot.interface_index(),
                }),
                Err(e) => {
                    self.ctx.events.emit(EngineEvent::RevertFailed {
                        interface_index: snapshot.interface_index(),
                        error: e.to_string(),
                    });
                    self.ctx.report_failure(FailureKind::Revert, &snapshot, e);
                }
            }
        }

        info!(
            "Reverted {} interface(s), {} failed",
            report.succeeded, report.failed
        );
        report
    }
}
