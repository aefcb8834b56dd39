//! Change dispatcher
//!
//! Consumes the change source's event stream on its own task, records each
//! change in the registry and re-applies the desired servers to the one
//! interface that changed.
//!
//! ## Event Flow
//!
//! 1. Change event arrives for interface `i`
//! 2. Build a successor snapshot (or capture a new one) and upsert it
//! 3. If `i` already reports the desired servers, skip (echo of our own write)
//! 4. Otherwise apply the desired servers to `i` only

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use super::EngineEvent;
use super::enforce::EnforcementController;
use super::sweep::SweepContext;
use crate::snapshot::Snapshot;
use crate::traits::{ChangeEvent, ChangeStream, InterfaceFilter};

pub(crate) struct Dispatcher {
    ctx: Arc<SweepContext>,
    enforcement: Arc<EnforcementController>,
    filter: InterfaceFilter,
    suppress_echo: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        ctx: Arc<SweepContext>,
        enforcement: Arc<EnforcementController>,
        filter: InterfaceFilter,
        suppress_echo: bool,
    ) -> Self {
        Self {
            ctx,
            enforcement,
            filter,
            suppress_echo,
        }
    }

    /// Start consuming `changes` on a new task
    pub(crate) fn spawn(self, changes: ChangeStream) -> Monitor {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(self.run(changes, shutdown_rx));

        Monitor {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    async fn run(self, mut changes: ChangeStream, mut shutdown_rx: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    debug!("Dispatcher received disarm signal");
                    break;
                }

                next = changes.next() => match next {
                    Some(event) => self.handle(event).await,
                    None => {
                        warn!(
                            "Change stream from {} ended, interface changes are no longer observed",
                            self.ctx.source.source_name()
                        );
                        break;
                    }
                },
            }
        }

        // Dropping the stream unsubscribes from the source
        drop(changes);
    }

    async fn handle(&self, event: ChangeEvent) {
        let record = event.record;
        let index = record.interface_index;

        if !self.filter.matches(&record) {
            debug!("Ignoring change on filtered interface {} ({})", index, record.setting_id);
            return;
        }

        let captured = {
            let mut guard = self.ctx.registry.lock().await;

            let next = match guard.get(index) {
                Some(previous) => previous.succeed(&record).map(|s| (s, false)),
                None => Snapshot::capture(&record).map(|s| (s, true)),
            };

            match next {
                Ok((snapshot, is_new)) => {
                    let originals = snapshot.original_dns_servers().to_vec();
                    guard.upsert(snapshot);
                    is_new.then_some(originals)
                }
                Err(e) => {
                    warn!("Dropping change event for interface {}: {}", index, e);
                    return;
                }
            }
        };

        if let Some(original_dns_servers) = captured {
            info!(
                "Tracking new interface {} ({}), original DNS servers {:?}",
                index, record.setting_id, original_dns_servers
            );
            self.ctx.events.emit(EngineEvent::InterfaceCaptured {
                interface_index: index,
                original_dns_servers,
            });
        }

        if self.suppress_echo && record.dns_servers.as_slice() == self.enforcement.desired() {
            debug!("Interface {} already reports the desired servers", index);
            self.ctx.events.emit(EngineEvent::EnforceSkipped {
                interface_index: index,
            });
            return;
        }

        let report = self.enforcement.apply_one(index).await;
        debug!("Re-applied DNS servers to interface {}: {:?}", index, report);
    }
}

/// Handle to a running dispatcher
///
/// Dropping a monitor without disarming it aborts the dispatcher task.
pub(crate) struct Monitor {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Stop the dispatcher and wait until it has exited
    ///
    /// An event already being handled runs to completion first. Once this
    /// returns, no further change is dispatched and the source stream has
    /// been dropped.
    pub(crate) async fn disarm(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // Err means the dispatcher already exited
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Dispatcher task failed: {}", e);
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
