//! # Ticketflow Server
//!
//! The projection service binary and the pieces it is assembled from.
//!
//! - [`config`]: environment configuration
//! - [`bootstrap`]: connects Postgres and Redpanda and builds the pipeline
//! - [`lifecycle`]: runs the HTTP surface and shuts everything down in order

pub mod bootstrap;
pub mod config;
pub mod lifecycle;

pub use bootstrap::{Pipeline, Stores, assemble, connect_broker, connect_stores};
pub use config::{Config, ConfigError};
pub use lifecycle::{Application, LifecycleError, ShutdownReport, shutdown_signal};
