#![deny(unused)]
//! Model gateway for CityDesk.
//!
//! This crate provides:
//! - Provider gateway with usage and cost tracking
//! - Rig LLM client adapter
//! - Invocation strategies (single, fallback chain, cross-validation)
//! - Agreement scoring

pub mod agreement;
pub mod config;
pub mod pricing;
pub mod providers;
pub mod rig_client;
pub mod strategies;

pub use config::build_gateway;
pub use pricing::{ModelPricing, PricingRegistry};
pub use providers::{ProviderGateway, ProviderInfo, ProviderStatus, UsageReport};
pub use rig_client::{RigConfig, RigLlmClient, RigProvider};
pub use strategies::{InvocationStrategies, COMPLETION_ENDPOINT};
