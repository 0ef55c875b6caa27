//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! transport / location subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges via the metrics facade)
//!
//! Consumers:
//!     → whatever subscriber / recorder the host process installs
//! ```

pub mod logging;
pub mod metrics;
