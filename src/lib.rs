//! chanwarden - channel access-control and membership-consistency engine.
//!
//! The crate is organized bottom-up:
//! - [`model`]: plain data types (channels, members, schemes, roles, groups)
//! - [`store`]: async persistence adapter (trait + SQLite implementation)
//! - [`engine`]: scheme resolution, permission moderation, the channel
//!   type/privacy state machine, and membership consistency enforcement
//! - [`config`], [`error`], [`metrics`], [`telemetry`]: ambient plumbing
//!
//! The engine never owns a transport: callers hand it a resolved
//! [`engine::Actor`] and receive typed results or typed failures.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod store;
pub mod telemetry;

pub use config::EngineConfig;
pub use engine::{Actor, ChannelEngine};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use store::{ChannelStore, SqliteStore, StoreError};
