//! Content fingerprints: an exact digest for duplicate detection and a dense
//! embedding for near-duplicate detection.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use freshdocs_providers::EmbeddingProvider;
use freshdocs_shared::{FreshDocsError, Result};

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Canonical form hashed by [`content_hash`]: lowercase, punctuation removed,
/// whitespace collapsed to single spaces.
pub fn canonical_form(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// SHA-256 (lowercase hex) of the canonical form of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_form(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns `0.0` when the dimensions differ, either vector is empty, or either
/// vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Embeds official content through the configured provider.
pub struct Fingerprinter {
    embedder: Arc<dyn EmbeddingProvider>,
    max_input_chars: usize,
}

impl Fingerprinter {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, max_input_chars: usize) -> Self {
        Self {
            embedder,
            max_input_chars,
        }
    }

    /// Embed `text`, truncated to `max_input_chars` characters. Provider
    /// failures surface as-is; there is no local retry.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_chars(text, self.max_input_chars);
        debug!(
            model = self.embedder.model(),
            chars = input.chars().count(),
            "embedding official content"
        );

        self.embedder
            .embed(&[input])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FreshDocsError::Embedding("provider returned no vector".into()))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedEmbedder;

    #[test]
    fn hash_is_deterministic_and_distinguishes_text() {
        let a = content_hash("Closures capture their environment.");
        assert_eq!(a, content_hash("Closures capture their environment."));
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("Closures borrow their environment."));
    }

    #[test]
    fn hash_ignores_case_punctuation_and_spacing() {
        assert_eq!(
            content_hash("Hello,   World!\n\nOwnership."),
            content_hash("hello world ownership")
        );
    }

    #[test]
    fn canonical_form_keeps_word_characters() {
        assert_eq!(canonical_form("  Vec<T>::push(x);  "), "vectpushx");
        assert_eq!(canonical_form("snake_case\tname"), "snake_case name");
    }

    #[test]
    fn similarity_of_vector_with_itself_is_one() {
        let v = [0.3_f32, -1.2, 4.0, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = [1.0_f32, 2.0, 3.0];
        let b = [-2.0_f32, 0.5, 1.0];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn degenerate_inputs_yield_zero() {
        let v = [1.0_f32, 2.0, 3.0];
        assert_eq!(cosine_similarity(&v, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&v, &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn opposite_vectors_are_minus_one() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-9);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[tokio::test]
    async fn embed_truncates_input() {
        let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
        let fingerprinter = Fingerprinter::new(embedder.clone(), 5);

        let vector = fingerprinter.embed("abcdefghij").await.expect("embed");
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(embedder.last_input().as_deref(), Some("abcde"));
    }
}
