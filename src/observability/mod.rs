//! Ambient observability surface (SPEC_FULL.md F.5): process-wide counters
//! and gauges the admin snapshot and tests fold in, modeled on the
//! teacher's `observability::metrics` module.

pub mod metrics;

pub use metrics::Metrics;
