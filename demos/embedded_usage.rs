//! Minimal embedding example for dnsguard-core
//!
//! This example drives the engine against a simulated host. The enforcer
//! lifecycle (start, monitor, stop) is fully managed by the application.

use dnsguard_core::engine::InterfaceFailure;
use dnsguard_core::traits::{ConfigurationRecord, DnsConfigurator};
use dnsguard_core::{DnsEnforcer, EngineConfig, InterfaceFilter, MemoryHost, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Custom configurator that prints every write before delegating to the host
struct PrintingConfigurator {
    host: MemoryHost,
    writes: AtomicUsize,
}

impl PrintingConfigurator {
    fn new(host: MemoryHost) -> Self {
        Self {
            host,
            writes: AtomicUsize::new(0),
        }
    }

    fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DnsConfigurator for PrintingConfigurator {
    async fn set_dns_servers(
        &self,
        target: &ConfigurationRecord,
        servers: &[String],
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if servers.is_empty() {
            println!("[Embedded] {} -> automatic", target.setting_id);
        } else {
            println!("[Embedded] {} -> {}", target.setting_id, servers.join(", "));
        }
        self.host.set_dns_servers(target, servers).await
    }

    fn configurator_name(&self) -> &'static str {
        "printing"
    }
}

fn servers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded dnsguard-core Example ===\n");

    // Simulated machine: two active adapters and one that is down
    let host = MemoryHost::new();
    host.add_interface(ConfigurationRecord::new(1, "eth0", servers(&["192.168.1.1"])));
    host.add_interface(ConfigurationRecord::new(2, "wlan0", servers(&["10.0.0.1"])));
    host.add_interface(
        ConfigurationRecord::new(3, "eth1", Vec::new()).with_ip_enabled(false),
    );

    let configurator = Arc::new(PrintingConfigurator::new(host.clone()));

    println!("1. Creating enforcer...");
    let (mut enforcer, mut event_rx) = DnsEnforcer::new(
        Arc::new(host.clone()),
        configurator.clone(),
        EngineConfig {
            event_channel_capacity: 100, // Small buffer for example
            ..EngineConfig::default()
        },
        InterfaceFilter::default(),
    )?;

    // Spawn event listener (optional)
    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
        println!("Event listener stopped");
    });

    let failures = Arc::new(AtomicUsize::new(0));
    let sink = {
        let failures = Arc::clone(&failures);
        Arc::new(move |failure: &InterfaceFailure| {
            failures.fetch_add(1, Ordering::SeqCst);
            println!("[Sink] {}", failure);
        })
    };

    println!("2. Starting enforcement...");
    let report = enforcer
        .start(servers(&["9.9.9.9", "149.112.112.112"]), sink)
        .await?;
    info!("Initial sweep: {:?}", report);

    println!("\n3. Another program rewrites eth0's DNS servers...");
    host.set_external(1, servers(&["203.0.113.53"]));
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("   eth0 now reports {:?}", host.dns_servers(1).unwrap_or_default());

    println!("\n4. A USB adapter is plugged in...");
    host.plug(ConfigurationRecord::new(4, "usb0", servers(&["192.0.2.1"])));
    tokio::time::sleep(Duration::from_millis(100)).await;

    for snapshot in enforcer.tracked_interfaces().await {
        println!(
            "   tracking {} (index {}), will restore {:?}",
            snapshot.setting_id(),
            snapshot.interface_index(),
            snapshot.original_dns_servers()
        );
    }

    println!("\n5. Stopping enforcement...");
    let report = enforcer.stop().await?;
    info!("Reversion sweep: {:?}", report);

    // Dropping the enforcer closes the event channel
    drop(enforcer);
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n=== Embedding Successful ===");
    println!("Writes issued: {}", configurator.write_count());
    println!("Failures reported: {}", failures.load(Ordering::SeqCst));
    for index in [1, 2, 3, 4] {
        println!(
            "interface {} restored to {:?}",
            index,
            host.dns_servers(index).unwrap_or_default()
        );
    }

    Ok(())
}
