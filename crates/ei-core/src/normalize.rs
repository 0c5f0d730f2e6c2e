//! Subject normalization and Jaccard similarity over subject tokens.
//!
//! Grounded in the reply/forward-prefix stripping the original Python
//! implementation performs before clustering on subject lines.

use std::collections::BTreeSet;

const REPLY_FORWARD_PREFIXES: &[&str] = &["re:", "fwd:", "fw:"];
const MIN_TOKEN_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "you", "your", "with", "from", "this", "that", "are", "was", "have",
    "has", "been", "will", "not", "but", "our", "their",
];

/// Strips repeated `Re:`/`Fwd:`/`Fw:` prefixes (case-insensitive) and
/// collapses whitespace, lowercasing the result.
///
/// `normalize("Re: Fwd: Hello") == normalize("hello")`.
pub fn normalize_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let lower = s.to_ascii_lowercase();
        let mut stripped = false;
        for prefix in REPLY_FORWARD_PREFIXES {
            if lower.starts_with(prefix) {
                s = s[prefix.len()..].trim_start();
                stripped = true;
                break;
            }
        }
        if !stripped {
            break;
        }
    }
    let collapsed: Vec<&str> = s.split_whitespace().collect();
    collapsed.join(" ").to_ascii_lowercase()
}

/// Tokenizes a normalized subject into a stopword-filtered, length-filtered
/// token set for Jaccard comparison.
pub fn subject_tokens(normalized_subject: &str) -> BTreeSet<String> {
    normalized_subject
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .filter(|t| !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Jaccard similarity between two token sets: `|A ∩ B| / |A ∪ B|`.
/// Empty/empty is defined as 0.0 (no signal, not a match).
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}
