//! Persistent store for the lead router.
//!
//! [`Store`] is the capability the distribution pipeline is written against.
//! [`PgStore`] backs it with Postgres; [`MemoryStore`] is a non-durable
//! stand-in for local runs and tests.

pub mod client;
pub mod config;
pub mod health;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;

pub use client::*;
pub use config::*;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::Store;
