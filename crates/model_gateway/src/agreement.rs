//! Agreement scoring for cross-validation.

use std::collections::HashSet;

use citydesk_core::types::Agreement;

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Jaccard similarity of the token sets of `a` and `b`.
///
/// Two texts without any tokens are identical.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let (a, b) = (tokens(a), tokens(b));
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Mean pairwise similarity of `outputs`, plus unanimity.
///
/// Fewer than two outputs give no score and are never unanimous.
pub fn score(outputs: &[&str]) -> Agreement {
    if outputs.len() < 2 {
        return Agreement {
            score: None,
            unanimous: false,
            compared_pairs: 0,
        };
    }

    let mut total = 0.0;
    let mut pairs = 0;
    for i in 0..outputs.len() {
        for j in (i + 1)..outputs.len() {
            total += jaccard(outputs[i], outputs[j]);
            pairs += 1;
        }
    }

    let first = normalize(outputs[0]);
    Agreement {
        score: Some(total / pairs as f64),
        unanimous: outputs[1..].iter().all(|o| normalize(o) == first),
        compared_pairs: pairs,
    }
}
