// # dnsguard-core
//
// Core library for pinning DNS servers on a machine's network interfaces.
//
// ## Architecture Overview
//
// This library provides the core functionality for DNS enforcement:
// - **ChangeSource**: Trait for enumerating interfaces and observing changes
// - **DnsConfigurator**: Trait for writing an interface's DNS servers
// - **ConfigRegistry**: Lock-guarded table of original-settings snapshots
// - **DnsEnforcer**: Engine driving capture → enforce → monitor → revert
// - **MemoryHost**: In-memory host for embedding and tests
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from platform backends
// 2. **Event-Driven**: Configuration changes arrive as an async stream
// 3. **Reversible**: Every interface touched is restored on stop
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod snapshot;
pub mod source;
pub mod traits;

// Re-export core types for convenience
pub use config::{BackendConfig, DnsGuardConfig, EngineConfig};
pub use engine::{
    DnsEnforcer, EngineEvent, EngineState, ErrorSink, FailureKind, InterfaceFailure, SweepReport,
};
pub use error::{Error, Result};
pub use registry::ConfigRegistry;
pub use snapshot::Snapshot;
pub use source::MemoryHost;
pub use traits::{ChangeSource, ConfigurationRecord, DnsConfigurator, InterfaceFilter};
