//! formkeep/crates/domains/src/lib.rs
//!
//! Entities, error taxonomy and port traits for formkeep.
//! Nothing in this crate performs I/O; adapters live in `storage-adapters`.

pub mod errors;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;
