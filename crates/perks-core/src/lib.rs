//! perks-core library.
//!
//! Tracks which rewards are applied to, and claimed by, each user, and serves
//! allow-listed projections of user and reward rows out of a `SQLite` store.
//!
//! # Conventions
//!
//! - **Errors**: store operations return [`error::PerksError`]; bootstrap
//!   helpers (opening the database, loading config) return `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod config;
pub mod db;
pub mod error;
pub mod fields;
pub mod model;
pub mod store;

pub use error::{ErrorCode, PerksError, StateConflict, ValidationError};
pub use store::{RewardStore, TransitionOutcome};
