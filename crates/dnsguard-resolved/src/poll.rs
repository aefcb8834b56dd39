// # DNS Poller
//
// systemd-resolved does not announce DNS changes over rtnetlink: a
// `resolvectl dns` issued by NetworkManager, networkd or a VPN client only
// shows up when the link is read again. This poller re-reads every link on
// a fixed interval and compares the result with the previous read.
//
// - The first read only records a baseline
// - A link whose record differs from the last read yields a ChangeEvent
// - Links that appeared since the last read count as changed
// - Links that vanished are forgotten
//
// The polling task is aborted when the returned stream is dropped.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use dnsguard_core::traits::{ChangeEvent, ChangeStream, ConfigurationRecord, InterfaceFilter};

use crate::ResolvedBackend;

/// Start polling every link's DNS servers
pub(crate) fn subscribe(
    backend: ResolvedBackend,
    filter: InterfaceFilter,
    interval: Duration,
) -> ChangeStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(poll_dns(backend, filter, interval, tx));

    info!("Polling link DNS servers every {:?}", interval);

    Box::pin(TaskStream::new(rx, task))
}

async fn poll_dns(
    backend: ResolvedBackend,
    filter: InterfaceFilter,
    interval: Duration,
    tx: mpsc::UnboundedSender<ChangeEvent>,
) {
    let mut last_seen: Option<BTreeMap<u32, ConfigurationRecord>> = None;

    loop {
        match backend.records().await {
            Ok(records) => {
                let changed = match &mut last_seen {
                    Some(previous) => changed_records(previous, records),
                    None => {
                        last_seen = Some(by_index(records));
                        Vec::new()
                    }
                };

                for record in changed {
                    if !filter.matches(&record) {
                        debug!("Polled change on link {} filtered out", record.setting_id);
                        continue;
                    }

                    debug!(
                        "Link {} now reports DNS servers {:?}",
                        record.setting_id, record.dns_servers
                    );
                    if tx.send(ChangeEvent::new(record)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("DNS poll failed, retrying next interval: {}", e);
            }
        }

        tokio::time::sleep(interval).await;
    }
}

fn by_index(records: Vec<ConfigurationRecord>) -> BTreeMap<u32, ConfigurationRecord> {
    records
        .into_iter()
        .map(|record| (record.interface_index, record))
        .collect()
}

/// Records that differ from `previous`; `previous` becomes `current`
fn changed_records(
    previous: &mut BTreeMap<u32, ConfigurationRecord>,
    current: Vec<ConfigurationRecord>,
) -> Vec<ConfigurationRecord> {
    let changed = current
        .iter()
        .filter(|record| previous.get(&record.interface_index) != Some(*record))
        .cloned()
        .collect();

    *previous = by_index(current);
    changed
}

/// Change stream fed by a background task, aborted on drop
pub(crate) struct TaskStream {
    inner: UnboundedReceiverStream<ChangeEvent>,
    task: JoinHandle<()>,
}

impl TaskStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ChangeEvent>, task: JoinHandle<()>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
            task,
        }
    }
}

impl Stream for TaskStream {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for TaskStream {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Change watcher task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u32, name: &str, server: &str) -> ConfigurationRecord {
        ConfigurationRecord::new(index, name, vec![server.to_string()])
    }

    #[test]
    fn test_changed_records() {
        let mut previous = by_index(vec![
            record(2, "eth0", "192.0.2.53"),
            record(3, "wlan0", "192.0.2.54"),
        ]);

        let changed = changed_records(
            &mut previous,
            vec![
                record(2, "eth0", "203.0.113.1"),
                record(3, "wlan0", "192.0.2.54"),
                record(4, "usb0", "192.0.2.55"),
            ],
        );

        assert_eq!(
            changed,
            vec![record(2, "eth0", "203.0.113.1"), record(4, "usb0", "192.0.2.55")]
        );
        assert_eq!(previous.len(), 3);

        // unchanged reads report nothing, vanished links are forgotten
        let changed = changed_records(&mut previous, vec![record(2, "eth0", "203.0.113.1")]);
        assert!(changed.is_empty());
        assert_eq!(previous.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_link_going_down_is_a_change() {
        let mut previous = by_index(vec![record(2, "eth0", "192.0.2.53")]);
        let down = record(2, "eth0", "192.0.2.53").with_ip_enabled(false);

        assert_eq!(changed_records(&mut previous, vec![down.clone()]), vec![down]);
    }

    #[cfg(unix)]
    mod polling {
        use super::*;
        use crate::fixture::{SCRIPT_LOCK, add_link, write_resolvectl};
        use tokio_stream::StreamExt;

        /// resolvectl that reports the contents of `<dir>/dns-<link>` and logs each read
        fn file_backed_resolvectl(dir: &std::path::Path) -> String {
            write_resolvectl(
                dir,
                &format!(
                    "if [ \"$1\" = dns ] && [ $# -eq 2 ]; then cat {0}/dns-$2 2>/dev/null; echo $2 >> {0}/reads.log; fi\n",
                    dir.display()
                ),
            )
        }

        /// Wait until the fake resolvectl has completed `count` reads
        async fn wait_for_reads(dir: &std::path::Path, count: usize) {
            let log = dir.join("reads.log");
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let reads = std::fs::read_to_string(&log).unwrap_or_default();
                    if reads.lines().count() >= count {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("baseline read within 5 seconds");
        }

        /// Replace a link's reported servers (rename keeps the poller from seeing a partial file)
        fn report_dns(dir: &std::path::Path, link: &str, index: u32, server: &str) {
            let staged = dir.join(format!("staged-{}", link));
            std::fs::write(&staged, format!("Link {} ({}): {}\n", index, link, server)).unwrap();
            std::fs::rename(staged, dir.join(format!("dns-{}", link))).unwrap();
        }

        #[tokio::test]
        async fn test_dns_only_change_is_reported() {
            let _serial = SCRIPT_LOCK.lock().await;
            let bin = tempfile::tempdir().unwrap();
            let net = tempfile::tempdir().unwrap();
            add_link(net.path(), "eth0", 2, "up");
            add_link(net.path(), "eth1", 3, "up");
            report_dns(bin.path(), "eth0", 2, "8.8.8.8");
            report_dns(bin.path(), "eth1", 3, "8.8.8.8");

            let backend = ResolvedBackend::new(file_backed_resolvectl(bin.path()), net.path());
            let mut stream = subscribe(
                backend,
                InterfaceFilter::default(),
                Duration::from_millis(20),
            );

            // both links read once: the baseline is recorded
            wait_for_reads(bin.path(), 2).await;
            report_dns(bin.path(), "eth1", 3, "203.0.113.1");

            let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("change reported within 5 seconds")
                .unwrap();

            assert_eq!(event.record.interface_index, 3);
            assert_eq!(event.record.setting_id, "eth1");
            assert_eq!(event.record.dns_servers, vec!["203.0.113.1".to_string()]);
        }

        #[tokio::test]
        async fn test_filtered_links_are_not_reported() {
            let _serial = SCRIPT_LOCK.lock().await;
            let bin = tempfile::tempdir().unwrap();
            let net = tempfile::tempdir().unwrap();
            add_link(net.path(), "eth0", 2, "up");
            add_link(net.path(), "wg0", 5, "up");
            report_dns(bin.path(), "eth0", 2, "8.8.8.8");
            report_dns(bin.path(), "wg0", 5, "8.8.8.8");

            let backend = ResolvedBackend::new(file_backed_resolvectl(bin.path()), net.path());
            let mut stream = subscribe(
                backend,
                InterfaceFilter::default().excluding("wg0"),
                Duration::from_millis(20),
            );

            wait_for_reads(bin.path(), 2).await;
            report_dns(bin.path(), "wg0", 5, "10.8.0.1");
            report_dns(bin.path(), "eth0", 2, "203.0.113.1");

            let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("change reported within 5 seconds")
                .unwrap();

            assert_eq!(event.record.setting_id, "eth0");
        }
    }
}
