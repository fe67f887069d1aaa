/// Mock embedder for testing purposes.
///
/// Generates deterministic embeddings based on text hash and follows the
/// same contract as the llama.cpp embedder: blank text is rejected and
/// output vectors are unit length.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::nomic::EMBED_DIM;
use super::{Embedder, EmbedderError, l2_normalize};

/// A mock embedder that produces deterministic vectors from text hashes.
///
/// Useful for testing without loading a GGUF model.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            dimensions: EMBED_DIM,
        }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if text.trim().is_empty() {
            return Err(EmbedderError::TokenizerError(
                "text produced no tokens".to_string(),
            ));
        }

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let bytes = hasher.finish().to_le_bytes();

        // Offset by one so no vector is all zeros
        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|i| {
                let v = (f32::from(bytes[i % 8]) + 1.0) / 256.0;
                if i % 3 == 0 { -v } else { v }
            })
            .collect();

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_mock_embed_dimensions() {
        let embedder = MockEmbedder::new(384);
        let result = embedder.embed("hello world").unwrap();
        assert_eq!(result.len(), 384);
    }

    #[test]
    fn test_mock_embed_deterministic() {
        let embedder = MockEmbedder::default();
        let a = embedder.embed("hello").unwrap();
        let b = embedder.embed("hello").unwrap();
        assert_eq!(a, b, "same input should produce same output");
    }

    #[test]
    fn test_mock_embed_normalized() {
        let embedder = MockEmbedder::default();
        let vec = embedder.embed("test normalization").unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 1e-4,
            "vector should be unit length, got {norm}"
        );
    }

    #[test]
    fn test_mock_rejects_blank_text() {
        let embedder = MockEmbedder::default();
        assert!(matches!(
            embedder.embed(""),
            Err(EmbedderError::TokenizerError(_))
        ));
        assert!(embedder.embed("   \n").is_err());
    }

    #[test]
    fn test_mock_document_and_query_prefixes() {
        let embedder = MockEmbedder::new(64);
        let doc = embedder.embed_document("rust").unwrap();
        let query = embedder.embed_query("rust").unwrap();
        assert_eq!(doc, embedder.embed("search_document: rust").unwrap());
        assert_eq!(query, embedder.embed("search_query: rust").unwrap());
        assert_ne!(doc, query);
    }

    #[test]
    fn test_mock_embed_sessions() {
        let embedder = MockEmbedder::new(32);
        let mut sessions = HashMap::new();
        sessions.insert("s1".to_string(), "fixed the parser".to_string());
        sessions.insert("s2".to_string(), "added a cache".to_string());

        let out = embedder.embed_sessions(&sessions).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out["s1"], embedder.embed_document("fixed the parser").unwrap());
        assert!(out.values().all(|v| v.len() == 32));
    }

    #[test]
    fn test_mock_embed_sessions_empty_body() {
        let embedder = MockEmbedder::new(32);
        let mut sessions = HashMap::new();
        sessions.insert("ok".to_string(), "text".to_string());
        sessions.insert("empty".to_string(), String::new());
        // The document prefix keeps an empty body non-blank
        assert!(embedder.embed_sessions(&sessions).is_ok());
    }

    #[test]
    fn test_mock_embed_batch() {
        let embedder = MockEmbedder::new(128);
        let results = embedder.embed_batch(&["a", "b", "c"]).unwrap();
        assert_eq!(results.len(), 3);
        assert!(embedder.embed_batch(&["a", ""]).is_err());
    }
}
