#![deny(unused)]
//! Governance for CityDesk.
//!
//! This crate provides:
//! - Admission control (per-provider token buckets with emergency overrides)
//! - Prometheus metrics helpers
//! - Logging and distributed tracing setup

pub mod admission;
pub mod metrics;
pub mod tracing_layer;

pub use admission::AdmissionController;
pub use self::metrics::{setup_metrics_recorder, track_command, track_invocation, track_tokens};
pub use tracing_layer::configure_tracing;
