//! Configuration registry
//!
//! The registry maps interface indexes to their [`Snapshot`]s. It is shared
//! between the control path (collection, sweeps) and the change dispatcher,
//! so every access goes through one owned lock.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnsguard_core::registry::ConfigRegistry;
//!
//! let registry = ConfigRegistry::new();
//! registry.upsert(snapshot).await;
//!
//! // Point-in-time consistent sweep
//! let guard = registry.lock().await;
//! let completed = guard.for_each(|snapshot| {
//!     println!("{}", snapshot.setting_id());
//!     true
//! });
//!
//! // Sweep that awaits per entry, counting as it goes
//! let written = guard
//!     .fold_async(0, |written, snapshot| async move {
//!         write(&snapshot).await;
//!         ControlFlow::Continue(written + 1)
//!     })
//!     .await;
//! ```
//!
//! ## Lock Discipline
//!
//! - Full sweeps hold a [`RegistryGuard`] for their whole duration
//! - Single-entry operations take the lock only for their own duration
//! - Visitors receive snapshots, never the registry, so a visitor cannot
//!   re-enter the lock

use std::collections::BTreeMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::snapshot::Snapshot;

/// Shared table of snapshots keyed by interface index
///
/// ## Thread Safety
///
/// The registry owns a `tokio::sync::Mutex`, so a guard may be held across
/// the awaits of a sweep. Iteration order is ascending interface index.
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    entries: Mutex<BTreeMap<u32, Arc<Snapshot>>>,
}

impl ConfigRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access for the lifetime of the returned guard
    ///
    /// The lock is released when the guard is dropped, on every exit path.
    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            entries: self.entries.lock().await,
        }
    }

    /// Run `body` with exclusive access to the registry
    pub async fn with_exclusive_access<R>(&self, body: impl FnOnce(&mut RegistryGuard<'_>) -> R) -> R {
        let mut guard = self.lock().await;
        body(&mut guard)
    }

    /// Insert or replace the entry for `snapshot.interface_index()`
    pub async fn upsert(&self, snapshot: Snapshot) {
        self.lock().await.upsert(snapshot);
    }

    /// Get the snapshot tracked for an interface
    pub async fn get(&self, interface_index: u32) -> Option<Arc<Snapshot>> {
        self.lock().await.get(interface_index)
    }

    /// Copy out a point-in-time view of every snapshot
    pub async fn snapshots(&self) -> Vec<Arc<Snapshot>> {
        self.lock().await.snapshots()
    }

    /// Get the number of tracked interfaces
    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }

    /// Check if the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.lock().await.is_empty()
    }
}

/// Exclusive, scoped access to a [`ConfigRegistry`]
#[derive(Debug)]
pub struct RegistryGuard<'a> {
    entries: MutexGuard<'a, BTreeMap<u32, Arc<Snapshot>>>,
}

impl RegistryGuard<'_> {
    /// Insert or replace the entry for `snapshot.interface_index()`
    pub fn upsert(&mut self, snapshot: Snapshot) {
        self.entries
            .insert(snapshot.interface_index(), Arc::new(snapshot));
    }

    pub fn get(&self, interface_index: u32) -> Option<Arc<Snapshot>> {
        self.entries.get(&interface_index).cloned()
    }

    /// Visit every snapshot in ascending interface order
    ///
    /// The visitor returns `false` to stop early.
    ///
    /// # Returns
    ///
    /// `true` if every entry was visited, `false` if the visitor stopped early
    pub fn for_each<F>(&self, mut visitor: F) -> bool
    where
        F: FnMut(&Snapshot) -> bool,
    {
        self.entries.values().all(|snapshot| visitor(snapshot))
    }

    /// Visit every snapshot in ascending interface order with an async
    /// visitor, threading an accumulator through the visits
    ///
    /// The lock stays held across every await of the visitor. The visitor
    /// returns `ControlFlow::Break` to stop early.
    ///
    /// # Returns
    ///
    /// `Continue` with the final accumulator if every entry was visited,
    /// `Break` with the accumulator the visitor stopped with otherwise
    pub async fn fold_async<A, F, Fut>(&self, init: A, mut visitor: F) -> ControlFlow<A, A>
    where
        F: FnMut(A, Arc<Snapshot>) -> Fut,
        Fut: Future<Output = ControlFlow<A, A>>,
    {
        let mut acc = init;
        for snapshot in self.entries.values() {
            match visitor(acc, Arc::clone(snapshot)).await {
                ControlFlow::Continue(next) => acc = next,
                ControlFlow::Break(done) => return ControlFlow::Break(done),
            }
        }
        ControlFlow::Continue(acc)
    }

    pub fn snapshots(&self) -> Vec<Arc<Snapshot>> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ConfigurationRecord;

    fn snapshot(index: u32, servers: &[&str]) -> Snapshot {
        let record = ConfigurationRecord::new(
            index,
            format!("if-{}", index),
            servers.iter().map(|s| s.to_string()).collect(),
        );
        Snapshot::capture(&record).unwrap()
    }

    #[tokio::test]
    async fn test_latest_upsert_wins() {
        let registry = ConfigRegistry::new();

        registry.upsert(snapshot(1, &["192.168.1.1"])).await;
        registry.upsert(snapshot(2, &["10.0.0.1"])).await;
        registry.upsert(snapshot(1, &["172.16.0.1"])).await;

        assert_eq!(registry.len().await, 2);
        let entry = registry.get(1).await.unwrap();
        assert_eq!(entry.original_dns_servers(), ["172.16.0.1"]);
    }

    #[tokio::test]
    async fn test_for_each_visits_in_index_order() {
        let registry = ConfigRegistry::new();
        for index in [5, 2, 9] {
            registry.upsert(snapshot(index, &[])).await;
        }

        let mut seen = Vec::new();
        let completed = registry.lock().await.for_each(|s| {
            seen.push(s.interface_index());
            true
        });

        assert!(completed);
        assert_eq!(seen, vec![2, 5, 9]);
    }

    #[tokio::test]
    async fn test_for_each_stops_early() {
        let registry = ConfigRegistry::new();
        for index in 1..=4 {
            registry.upsert(snapshot(index, &[])).await;
        }

        let mut visited = 0;
        let completed = registry.lock().await.for_each(|s| {
            visited += 1;
            s.interface_index() < 2
        });

        assert!(!completed);
        assert_eq!(visited, 2);
    }

    #[tokio::test]
    async fn test_fold_async_holds_lock_across_awaits() {
        let registry = ConfigRegistry::new();
        for index in [3, 1, 2] {
            registry.upsert(snapshot(index, &[])).await;
        }

        let registry = &registry;
        let guard = registry.lock().await;
        let result = guard
            .fold_async(Vec::new(), move |mut seen, snapshot| async move {
                // a writer cannot get in while the sweep is running
                let blocked = tokio::time::timeout(
                    std::time::Duration::from_millis(10),
                    registry.upsert(snapshot.as_ref().clone()),
                )
                .await
                .is_err();
                assert!(blocked);

                seen.push(snapshot.interface_index());
                ControlFlow::Continue(seen)
            })
            .await;

        assert_eq!(result, ControlFlow::Continue(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_fold_async_stops_early() {
        let registry = ConfigRegistry::new();
        for index in 1..=4 {
            registry.upsert(snapshot(index, &[])).await;
        }

        let result = registry
            .lock()
            .await
            .fold_async(0, |visited, snapshot| async move {
                tokio::task::yield_now().await;
                if snapshot.interface_index() == 2 {
                    ControlFlow::Break(visited + 1)
                } else {
                    ControlFlow::Continue(visited + 1)
                }
            })
            .await;

        assert_eq!(result, ControlFlow::Break(2));
    }

    #[tokio::test]
    async fn test_exclusive_access_releases_lock() {
        let registry = ConfigRegistry::new();

        let count = registry
            .with_exclusive_access(|guard| {
                guard.upsert(snapshot(7, &["9.9.9.9"]));
                guard.len()
            })
            .await;
        assert_eq!(count, 1);

        // would hang if the scope above leaked the lock
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            registry.upsert(snapshot(8, &[])),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_writer_waits_for_sweep() {
        let registry = Arc::new(ConfigRegistry::new());
        registry.upsert(snapshot(1, &[])).await;

        let guard = registry.lock().await;
        let writer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.upsert(snapshot(2, &[])).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(guard.len(), 1, "writer must not land mid-sweep");
        drop(guard);

        writer.await.unwrap();
        assert_eq!(registry.len().await, 2);
    }
}
