#![deny(unused)]
//! Command routing for CityDesk.
//!
//! This crate provides:
//! - The command ledger (lifecycle state with compare-and-set transitions)
//! - Intent planning and parameter validation
//! - A bounded worker pool
//! - The command router tying them to the invocation strategies

pub mod builder;
pub mod ledger;
pub mod planner;
pub mod router;
pub mod scheduler;

pub use builder::CommandRouterBuilder;
pub use ledger::CommandLedger;
pub use planner::{plan, Plan, Route};
pub use router::CommandRouter;
pub use scheduler::WorkerPool;
