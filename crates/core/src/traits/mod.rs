//! Core traits for CityDesk.
//!
//! Traits are organized by collaborator:
//! - `llm`: provider backends (LlmProvider)
//! - `retrieval`: document retrieval (Retriever)
//! - `store`: audit persistence (RecordStore)

pub mod llm;
pub mod retrieval;
pub mod store;

pub use llm::*;
pub use retrieval::*;
pub use store::*;
