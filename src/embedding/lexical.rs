//! Deterministic lexical fallback embedder.
//!
//! Hashes word tokens and character 4-grams into a fixed 384-dimension
//! space and L2-normalizes. No vocabulary, no state: the same text always
//! produces the same vector, across processes and across runs, which keeps
//! bulk re-embedding idempotent. Character grams let morphological variants
//! ("octahedra" / "octahedral") share mass that whole-word hashing would
//! miss.

use super::Embedder;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

const LEXICAL_DIMENSIONS: usize = 384;
const GRAM_SIZE: usize = 4;
const GRAM_WEIGHT: f32 = 0.6;

#[allow(clippy::expect_used)]
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("token pattern is valid"));

static STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "has", "him", "his", "how", "its", "may", "this", "that", "with",
    "have", "from", "they", "been", "were", "what", "when", "will", "would", "there", "their",
    "about", "which", "into", "more", "some", "them", "than", "then", "does", "just", "also",
    "very", "over", "such", "only", "most", "your", "because",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Hash a term into a bucket index.
fn bucket(term: &str) -> usize {
    let digest = Sha256::digest(term.as_bytes());
    let mut value = 0usize;
    for &byte in &digest[..8] {
        value = (value << 8) | usize::from(byte);
    }
    value % LEXICAL_DIMENSIONS
}

/// Stateless hashed bag-of-features embedder.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalEmbedder;

impl LexicalEmbedder {
    /// Creates the embedder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Embedder for LexicalEmbedder {
    fn dimensions(&self) -> usize {
        LEXICAL_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let mut vector = vec![0.0f32; LEXICAL_DIMENSIONS];

        for token in TOKEN_RE.find_iter(&lowered).map(|m| m.as_str()) {
            if token.len() < 3 || is_stop_word(token) {
                continue;
            }
            vector[bucket(token)] += 1.0;

            if token.len() >= GRAM_SIZE {
                let bytes = token.as_bytes();
                for window in bytes.windows(GRAM_SIZE) {
                    // Tokens are ASCII by construction of TOKEN_RE.
                    if let Ok(gram) = std::str::from_utf8(window) {
                        vector[bucket(gram)] += GRAM_WEIGHT;
                    }
                }
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    fn embed(text: &str) -> Vec<f32> {
        LexicalEmbedder::new().embed(text).unwrap_or_default()
    }

    #[test]
    fn test_deterministic_across_calls() {
        let a = embed("I find octahedra deeply satisfying");
        let b = embed("I find octahedra deeply satisfying");
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimensions_and_normalization() {
        let v = embed("regular polyhedra");
        assert_eq!(v.len(), LEXICAL_DIMENSIONS);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_morphological_variants_overlap() {
        let a = embed("I enjoy octahedra");
        let b = embed("Octahedral forms feel honest");
        let c = embed("The weather is cold");
        let related = cosine_similarity(&a, &b);
        let unrelated = cosine_similarity(&a, &c);
        assert!(related > 0.3, "expected shared grams, got {related}");
        assert!(unrelated < 0.1, "expected near-zero, got {unrelated}");
    }

    #[test]
    fn test_empty_text_yields_zero_vector() {
        let v = embed("");
        assert!(v.iter().all(|x| x.abs() < f32::EPSILON));
    }

    #[test]
    fn test_stop_words_ignored() {
        let v = embed("the and for with have");
        assert!(v.iter().all(|x| x.abs() < f32::EPSILON));
    }
}
