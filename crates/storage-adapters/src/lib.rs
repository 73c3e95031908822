//! # storage-adapters
//!
//! Implementations of the `domains` ports.
//!
//! - [`memory::InMemoryFormStore`] is always compiled and backs tests and
//!   single-process deployments.
//! - [`postgres::PgFormStore`] is compiled with the `db-postgres` feature.

pub mod memory;
mod plan;

#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::InMemoryFormStore;

#[cfg(feature = "db-postgres")]
pub use postgres::PgFormStore;
