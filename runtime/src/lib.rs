//! # Ticketflow Runtime
//!
//! Execution machinery of the ticket read-side pipeline.
//!
//! - [`dispatcher`]: routes a domain event to every handler registered for its
//!   type, isolating handler failures and panics
//! - [`effects`]: the two side-effect combinators projections are built from
//!   (wait-all persistence, tracked spawn-and-log fan-out)
//! - [`listener`]: the broker listener host feeding broker messages back into
//!   the dispatcher
//! - [`metrics`]: Prometheus metrics for all of the above
//!
//! ## Flow
//!
//! ```text
//! broker ──► ListenerHost ──decode──► Dispatcher ──► EventHandler(s)
//!                                         ▲               │
//! command side (external) ────────────────┘               ├─ wait_all(update, add)
//!                                                         └─ FanoutTracker::spawn_logged
//! ```

pub mod dispatcher;
pub mod effects;
pub mod listener;
pub mod metrics;

pub use dispatcher::{
    DispatchReport, Dispatcher, DispatcherBuilder, EventHandler, HandlerFuture, HandlerOutcome,
};
pub use effects::{FanoutTracker, wait_all};
pub use listener::{EndpointStats, HostState, ListenerConfig, ListenerHost, QueueBinding};
