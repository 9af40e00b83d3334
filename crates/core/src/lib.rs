#![deny(unused)]
//! Core types, traits, and error definitions for CityDesk.
//!
//! This crate provides the foundational building blocks shared by the
//! admission controller, the provider gateway, the command router and their
//! collaborators.

pub mod config;
pub mod error;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, ProviderFailure, Result};
pub use traits::*;
pub use types::*;
