//! Built-in change sources
//!
//! Platform backends live in their own crates; this module only carries the
//! in-memory host used for embedding and tests.

pub mod memory;

pub use memory::{MemoryHost, WriteRecord};
