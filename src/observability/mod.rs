//! Observability for the middleware
//!
//! - Structured JSON logging, one line per event
//! - Typed lifecycle events
//! - Monotonic counters shared by every subsystem
//!
//! Observability is read-only: nothing here changes what an operation
//! does, and a failed log write never fails the operation that emitted it.
//!
//! ```ignore
//! use fragdb::observability::{Event, Logger, MetricsRegistry};
//!
//! Logger::event(Event::ReplicationDeferred, &[("key", "4"), ("target", "node2")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_replications_deferred();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
