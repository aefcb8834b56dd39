// # dnsguardd - DNS Guard Daemon
//
// The dnsguardd daemon is responsible for:
// 1. Reading configuration from a JSON file and environment variables
// 2. Initializing tracing and the runtime
// 3. Building the backend and starting the DnsEnforcer
// 4. Reverting every interface on SIGTERM / SIGINT
//
// All enforcement logic lives in dnsguard-core; this is a thin shell.
//
// ## Configuration
//
// Environment variables override values from the optional JSON file.
//
// - `DNSGUARD_CONFIG`: Path to a JSON config file (optional)
// - `DNSGUARD_SERVERS`: Comma-separated DNS servers to enforce (required unless in file).
//   Entries are passed to the backend as-is; it rejects what it cannot apply.
// - `DNSGUARD_EXCLUDE`: Comma-separated interface names never touched
// - `DNSGUARD_INCLUDE_INACTIVE`: Also enforce interfaces that are down (true/false)
// - `DNSGUARD_BACKEND`: Backend type (resolved, memory)
// - `DNSGUARD_RESOLVECTL`: Path to resolvectl (resolved backend)
// - `DNSGUARD_SYSFS_ROOT`: sysfs network class directory (resolved backend)
// - `DNSGUARD_DNS_POLL_SECS`: Seconds between DNS re-reads of every link (resolved backend)
// - `DNSGUARD_EVENT_CAPACITY`: Engine event channel capacity
// - `DNSGUARD_SUPPRESS_ECHO`: Skip re-applying when a change already shows the desired servers
// - `DNSGUARD_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export DNSGUARD_SERVERS=9.9.9.9,149.112.112.112
// export DNSGUARD_EXCLUDE=wg0,tailscale0
//
// dnsguardd
// ```

use anyhow::{Context, Result};
use dnsguard_core::engine::InterfaceFailure;
use dnsguard_core::traits::{ChangeSource, DnsConfigurator};
use dnsguard_core::{BackendConfig, DnsEnforcer, DnsGuardConfig, EngineEvent, MemoryHost};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound on the reversion sweep after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<GuardExitCode> for ExitCode {
    fn from(code: GuardExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
struct Config {
    guard: DnsGuardConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from the process environment
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut guard = match lookup("DNSGUARD_CONFIG") {
            Some(path) => {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read DNSGUARD_CONFIG file {}", path))?;
                DnsGuardConfig::from_json(&json)
                    .with_context(|| format!("invalid DNSGUARD_CONFIG file {}", path))?
            }
            None => DnsGuardConfig::new(Vec::new()),
        };

        if let Some(servers) = lookup("DNSGUARD_SERVERS") {
            guard.servers = split_list(&servers);
        }

        if let Some(exclude) = lookup("DNSGUARD_EXCLUDE") {
            guard.filter.exclude = split_list(&exclude);
        }

        if let Some(value) = lookup("DNSGUARD_INCLUDE_INACTIVE") {
            guard.filter.ip_enabled_only = !parse_bool("DNSGUARD_INCLUDE_INACTIVE", &value)?;
        }

        if let Some(backend) = lookup("DNSGUARD_BACKEND") {
            guard.backend = match backend.as_str() {
                // keep settings from the file when it already selected resolved
                "resolved" => match guard.backend {
                    resolved @ BackendConfig::Resolved { .. } => resolved,
                    _ => BackendConfig::default(),
                },
                "memory" => BackendConfig::Memory,
                other => anyhow::bail!(
                    "DNSGUARD_BACKEND '{}' is not supported. Supported backends: resolved, memory",
                    other
                ),
            };
        }

        if let BackendConfig::Resolved {
            resolvectl,
            sysfs_root,
            dns_poll_secs,
        } = &mut guard.backend
        {
            if let Some(path) = lookup("DNSGUARD_RESOLVECTL") {
                *resolvectl = path;
            }
            if let Some(path) = lookup("DNSGUARD_SYSFS_ROOT") {
                *sysfs_root = path;
            }
            if let Some(secs) = lookup("DNSGUARD_DNS_POLL_SECS") {
                *dns_poll_secs = secs.parse().with_context(|| {
                    format!("DNSGUARD_DNS_POLL_SECS must be a number. Got: {}", secs)
                })?;
            }
        }

        if let Some(capacity) = lookup("DNSGUARD_EVENT_CAPACITY") {
            guard.engine.event_channel_capacity = capacity.parse().with_context(|| {
                format!("DNSGUARD_EVENT_CAPACITY must be a number. Got: {}", capacity)
            })?;
        }

        if let Some(value) = lookup("DNSGUARD_SUPPRESS_ECHO") {
            guard.engine.suppress_echo = parse_bool("DNSGUARD_SUPPRESS_ECHO", &value)?;
        }

        Ok(Self {
            guard,
            log_level: lookup("DNSGUARD_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.guard.servers.is_empty() {
            anyhow::bail!(
                "DNSGUARD_SERVERS must contain at least one server. \
                Set it via: export DNSGUARD_SERVERS=9.9.9.9,149.112.112.112"
            );
        }

        self.guard.validate()?;

        #[cfg(not(feature = "resolved"))]
        if matches!(self.guard.backend, BackendConfig::Resolved { .. }) {
            anyhow::bail!("resolved backend requested but dnsguardd was built without it");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DNSGUARD_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", name, value),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return GuardExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return GuardExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return GuardExitCode::ConfigError.into();
    }

    info!("Starting dnsguardd daemon");
    info!(
        "Enforcing {:?} via {} backend",
        config.guard.servers,
        config.guard.backend.type_name()
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return GuardExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Run the daemon until a shutdown signal has been handled
async fn run_daemon(config: Config) -> GuardExitCode {
    let (source, configurator) = match build_backend(&config.guard.backend) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to build backend: {:#}", e);
            return GuardExitCode::ConfigError;
        }
    };

    let (mut enforcer, events) = match DnsEnforcer::new(
        source,
        configurator,
        config.guard.engine.clone(),
        config.guard.filter.clone(),
    ) {
        Ok(created) => created,
        Err(e) => {
            error!("Failed to create enforcer: {}", e);
            return GuardExitCode::ConfigError;
        }
    };

    let event_logger = tokio::spawn(log_events(events));

    // Failures are already logged by the engine; the sink only counts them
    let failures = Arc::new(AtomicUsize::new(0));
    let sink = {
        let failures = Arc::clone(&failures);
        Arc::new(move |_failure: &InterfaceFailure| {
            failures.fetch_add(1, Ordering::Relaxed);
        })
    };

    match enforcer.start(config.guard.servers.clone(), sink).await {
        Ok(report) => info!(
            "Enforcement active: {} interface(s) enforced, {} failed",
            report.succeeded, report.failed
        ),
        Err(e) => {
            error!("Failed to start enforcement: {}", e);
            return GuardExitCode::ConfigError;
        }
    }

    let exit = match wait_for_shutdown().await {
        Ok(signal) => {
            info!("Received shutdown signal: {}", signal);
            GuardExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Shutdown error: {:#}", e);
            GuardExitCode::RuntimeError
        }
    };

    info!("Reverting DNS settings");
    let exit = match tokio::time::timeout(SHUTDOWN_TIMEOUT, enforcer.stop()).await {
        Ok(Ok(report)) => {
            info!(
                "Reverted {} interface(s), {} failed; {} failure(s) this session",
                report.succeeded,
                report.failed,
                failures.load(Ordering::Relaxed)
            );
            exit
        }
        Ok(Err(e)) => {
            error!("Failed to stop enforcement: {}", e);
            GuardExitCode::RuntimeError
        }
        Err(_) => {
            error!("Reversion did not finish within {:?}", SHUTDOWN_TIMEOUT);
            GuardExitCode::RuntimeError
        }
    };

    drop(enforcer);
    if let Err(e) = event_logger.await {
        warn!("Event logger task failed: {}", e);
    }

    exit
}

type Backend = (Arc<dyn ChangeSource>, Arc<dyn DnsConfigurator>);

fn build_backend(config: &BackendConfig) -> Result<Backend> {
    match config {
        #[cfg(feature = "resolved")]
        BackendConfig::Resolved { .. } => {
            let backend = Arc::new(dnsguard_resolved::ResolvedBackend::from_config(config)?);
            let source: Arc<dyn ChangeSource> = backend.clone();
            let configurator: Arc<dyn DnsConfigurator> = backend;
            Ok((source, configurator))
        }
        #[cfg(not(feature = "resolved"))]
        BackendConfig::Resolved { .. } => {
            anyhow::bail!("resolved backend requested but dnsguardd was built without it")
        }
        BackendConfig::Memory => {
            warn!("Using the in-memory backend; no system settings will change");
            let host = Arc::new(MemoryHost::new());
            let source: Arc<dyn ChangeSource> = host.clone();
            let configurator: Arc<dyn DnsConfigurator> = host;
            Ok((source, configurator))
        }
    }
}

/// Log engine events until the enforcer is dropped
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::InterfaceCaptured {
                interface_index,
                original_dns_servers,
            } => info!(
                "Interface {} captured, original DNS servers {:?}",
                interface_index, original_dns_servers
            ),
            EngineEvent::EnforceFailed {
                interface_index,
                error,
            } => warn!("Enforcement failed on interface {}: {}", interface_index, error),
            EngineEvent::RevertFailed {
                interface_index,
                error,
            } => warn!("Reversion failed on interface {}: {}", interface_index, error),
            EngineEvent::Enforced { interface_index } => {
                info!("DNS servers enforced on interface {}", interface_index)
            }
            other => tracing::debug!("Engine event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    // Set up signal handlers for SIGTERM and SIGINT
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_env_only_config() {
        let config = config_from(&[
            ("DNSGUARD_SERVERS", "9.9.9.9, 149.112.112.112"),
            ("DNSGUARD_EXCLUDE", "wg0,,tailscale0"),
            ("DNSGUARD_INCLUDE_INACTIVE", "yes"),
            ("DNSGUARD_SUPPRESS_ECHO", "false"),
        ])
        .unwrap();

        assert_eq!(config.guard.servers, vec!["9.9.9.9", "149.112.112.112"]);
        assert_eq!(config.guard.filter.exclude, vec!["wg0", "tailscale0"]);
        assert!(!config.guard.filter.ip_enabled_only);
        assert!(!config.guard.engine.suppress_echo);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_servers_fails_validation() {
        let config = config_from(&[]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_syntax_is_left_to_backend() {
        let config = config_from(&[(
            "DNSGUARD_SERVERS",
            "1.1.1.1#one.one.one.one,9.9.9.9:853,fe80::1%eth0",
        )])
        .unwrap();

        assert_eq!(
            config.guard.servers,
            vec!["1.1.1.1#one.one.one.one", "9.9.9.9:853", "fe80::1%eth0"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(config_from(&[("DNSGUARD_EVENT_CAPACITY", "lots")]).is_err());
        assert!(config_from(&[("DNSGUARD_SUPPRESS_ECHO", "maybe")]).is_err());
        assert!(config_from(&[("DNSGUARD_BACKEND", "networkmanager")]).is_err());
        assert!(config_from(&[("DNSGUARD_DNS_POLL_SECS", "often")]).is_err());

        let config = config_from(&[
            ("DNSGUARD_SERVERS", "9.9.9.9"),
            ("DNSGUARD_LOG_LEVEL", "loud"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolved_overrides() {
        let config = config_from(&[
            ("DNSGUARD_SERVERS", "1.1.1.1"),
            ("DNSGUARD_RESOLVECTL", "/usr/local/bin/resolvectl"),
            ("DNSGUARD_SYSFS_ROOT", "/tmp/net"),
            ("DNSGUARD_DNS_POLL_SECS", "15"),
        ])
        .unwrap();

        assert_eq!(
            config.guard.backend,
            BackendConfig::Resolved {
                resolvectl: "/usr/local/bin/resolvectl".to_string(),
                sysfs_root: "/tmp/net".to_string(),
                dns_poll_secs: 15,
            }
        );
    }

    fn write_config(dir: &tempfile::TempDir, json: &str) -> String {
        let path = dir.path().join("config.json");
        std::fs::write(&path, json).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{ "servers": ["8.8.8.8"], "backend": { "type": "memory" } }"#,
        );

        let config = config_from(&[
            ("DNSGUARD_CONFIG", path.as_str()),
            ("DNSGUARD_SERVERS", "1.1.1.1"),
        ])
        .unwrap();

        assert_eq!(config.guard.servers, vec!["1.1.1.1"]);
        assert_eq!(config.guard.backend, BackendConfig::Memory);
    }

    #[test]
    fn test_backend_override_keeps_file_resolved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{
                "servers": ["8.8.8.8"],
                "backend": {
                    "type": "resolved",
                    "resolvectl": "/opt/systemd/bin/resolvectl",
                    "sysfs_root": "/run/netns/sys",
                    "dns_poll_secs": 20
                }
            }"#,
        );

        let config = config_from(&[
            ("DNSGUARD_CONFIG", path.as_str()),
            ("DNSGUARD_BACKEND", "resolved"),
        ])
        .unwrap();

        assert_eq!(
            config.guard.backend,
            BackendConfig::Resolved {
                resolvectl: "/opt/systemd/bin/resolvectl".to_string(),
                sysfs_root: "/run/netns/sys".to_string(),
                dns_poll_secs: 20,
            }
        );

        // switching from another backend starts from the defaults
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{ "servers": ["8.8.8.8"], "backend": { "type": "memory" } }"#,
        );
        let config = config_from(&[
            ("DNSGUARD_CONFIG", path.as_str()),
            ("DNSGUARD_BACKEND", "resolved"),
        ])
        .unwrap();
        assert_eq!(config.guard.backend, BackendConfig::default());
    }

    #[tokio::test]
    async fn test_memory_backend_builds() {
        assert!(build_backend(&BackendConfig::Memory).is_ok());
    }
}
