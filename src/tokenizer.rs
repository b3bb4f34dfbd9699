//! Tokenizer abstraction (§9 design note: `CountTokens(string) (int)`).
//!
//! Token counting is injected and opaque to this crate, mirroring how
//! [`crate::embedding::EmbeddingService`] and [`crate::tagging::TagService`]
//! are injected. [`WhitespaceTokenizer`] is the dependency-free default used
//! when no model-specific tokenizer (a BPE or WordPiece vocabulary matching
//! the embedding/generation model in use) is wired in.

/// Narrow tokenizer interface used to compute `Node::token_count` at
/// `Remember` time and to size working-memory entries (§3, §4.5).
pub trait Tokenizer: Send + Sync {
    /// Counts tokens in `text` under this tokenizer's vocabulary.
    fn count_tokens(&self, text: &str) -> u32;
}

/// Dependency-free whitespace tokenizer. Approximates a real subword
/// tokenizer's count with a plain word count, which is close enough for
/// working-memory budget accounting but should not be relied on for
/// provider-specific context-window arithmetic.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count_tokens(&self, text: &str) -> u32 {
        let words = text.split_whitespace().count();
        u32::try_from(words).unwrap_or(u32::MAX)
    }
}
