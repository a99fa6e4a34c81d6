//! Per-scope entry points callers talk to.

pub mod container;
pub mod database;

pub use container::ContainerApi;
pub use database::DatabaseApi;
