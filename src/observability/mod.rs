//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Engine, protocol layer, discovery produce:
//!     → logging.rs (structured tracing events, handle/peer fields)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (human or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Every connection event carries the handle as a field
//! - Metrics are recorded even without an exporter; they are no-ops then

pub mod logging;
pub mod metrics;
