// # Link Monitor
//
// Watches rtnetlink link notifications and turns each `RTM_NEWLINK` into a
// fresh ChangeEvent for the affected interface. This covers links coming up,
// going down and appearing; DNS-only changes are picked up by the poller.
//
// ## Flow
//
// 1. Bind a NETLINK_ROUTE socket to the RTMGRP_LINK multicast group
// 2. For each NewLink message, re-read the link (sysfs + resolvectl)
// 3. Forward records matching the subscription filter
//
// The reader task is aborted when the returned stream is dropped.

use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::RtnlMessage;
use netlink_sys::{AsyncSocket, AsyncSocketExt, SocketAddr, TokioSocket, protocols::NETLINK_ROUTE};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use dnsguard_core::traits::{ChangeEvent, ChangeStream, InterfaceFilter};
use dnsguard_core::{Error, Result};

use crate::ResolvedBackend;
use crate::poll::TaskStream;

/// Open the link notification socket and start forwarding changes
pub(crate) fn subscribe(backend: ResolvedBackend, filter: InterfaceFilter) -> Result<ChangeStream> {
    let mut socket = TokioSocket::new(NETLINK_ROUTE)
        .map_err(|e| Error::subscription(format!("cannot open rtnetlink socket: {}", e)))?;

    socket
        .socket_mut()
        .bind(&SocketAddr::new(0, libc::RTMGRP_LINK as u32))
        .map_err(|e| Error::subscription(format!("cannot join link multicast group: {}", e)))?;

    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(read_links(socket, backend, filter, tx));

    info!("Subscribed to rtnetlink link notifications");

    Ok(Box::pin(TaskStream::new(rx, task)))
}

async fn read_links(
    socket: TokioSocket,
    backend: ResolvedBackend,
    filter: InterfaceFilter,
    tx: mpsc::UnboundedSender<ChangeEvent>,
) {
    loop {
        let (buf, _) = match socket.recv_from_full().await {
            Ok(received) => received,
            Err(e) => {
                warn!("rtnetlink receive failed, link monitoring stopped: {}", e);
                return;
            }
        };

        for index in new_link_indexes(&buf) {
            let record = match backend.record_by_index(index).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!("Link {} disappeared before it could be read", index);
                    continue;
                }
                Err(e) => {
                    warn!("Cannot read link {} after notification: {}", index, e);
                    continue;
                }
            };

            if !filter.matches(&record) {
                continue;
            }

            if tx.send(ChangeEvent::new(record)).is_err() {
                // Subscriber dropped the stream
                return;
            }
        }
    }
}

/// Interface indexes of every RTM_NEWLINK message in a datagram
fn new_link_indexes(mut buf: &[u8]) -> Vec<u32> {
    let mut indexes = Vec::new();

    while !buf.is_empty() {
        let message = match NetlinkMessage::<RtnlMessage>::deserialize(buf) {
            Ok(message) => message,
            Err(e) => {
                warn!("Discarding undecodable rtnetlink message: {}", e);
                break;
            }
        };

        if let NetlinkPayload::InnerMessage(RtnlMessage::NewLink(link)) = &message.payload {
            if !indexes.contains(&link.header.index) {
                indexes.push(link.header.index);
            }
        }

        let length = message.header.length as usize;
        if length == 0 || length > buf.len() {
            break;
        }
        buf = &buf[nlmsg_align(length).min(buf.len())..];
    }

    indexes
}

fn nlmsg_align(length: usize) -> usize {
    (length + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align() {
        assert_eq!(nlmsg_align(16), 16);
        assert_eq!(nlmsg_align(17), 20);
    }

    #[test]
    fn test_garbage_yields_no_indexes() {
        assert!(new_link_indexes(&[0xff, 0x00, 0x01]).is_empty());
        assert!(new_link_indexes(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_subscription_opens_and_releases() {
        let backend = ResolvedBackend::new("resolvectl", "/sys/class/net");

        let stream = subscribe(backend, InterfaceFilter::default())
            .expect("link multicast group can be joined without privileges");
        drop(stream);
    }
}
