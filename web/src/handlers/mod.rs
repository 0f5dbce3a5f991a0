//! HTTP request handlers.

pub mod health;
pub mod websocket;

pub use health::{health_check, realtime_health};
