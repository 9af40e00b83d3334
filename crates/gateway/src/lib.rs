#![deny(unused)]
//! HTTP gateway for CityDesk.
//!
//! This crate exposes the command router over a JSON HTTP API.

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, GatewayConfig, GatewayServer};
