//! Core type definitions for CityDesk.
//!
//! Broken down into submodules by component.

pub mod command;
pub mod invocation;
pub mod provider;
pub mod quota;
pub mod retrieval;

pub use command::*;
pub use invocation::*;
pub use provider::*;
pub use quota::*;
pub use retrieval::*;
