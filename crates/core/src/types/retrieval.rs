use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A ranked passage returned by the retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    /// Relevance score, higher is better.
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}
