/// Embedder trait and shared types for text embedding.
///
/// The nomic models are trained with task instructions, so the trait carries
/// provided methods that apply the document/query prefix before embedding.
pub mod download;
pub mod mock;
pub mod nomic;

use std::collections::HashMap;

use thiserror::Error;

/// Errors that can occur during embedding operations.
///
/// The inference engine reports failures as bare status codes, so each variant
/// only names the stage that failed.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("embedding extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("nomic embeddings not supported on this build")]
    NotSupported,
}

/// Task instruction understood by nomic-embed-text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Text stored in the index.
    Document,
    /// Text used to search the index.
    Query,
}

impl Task {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Task::Document => "search_document: ",
            Task::Query => "search_query: ",
        }
    }

    /// Prepend the task prefix to `text`.
    #[must_use]
    pub fn apply(self, text: &str) -> String {
        let prefix = self.prefix();
        let mut s = String::with_capacity(prefix.len() + text.len());
        s.push_str(prefix);
        s.push_str(text);
        s
    }
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string verbatim into a unit-length vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, one forward pass each.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Embed text that will be stored and searched against.
    fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed(&Task::Document.apply(text))
    }

    /// Embed a search query.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed(&Task::Query.apply(text))
    }

    /// Embed each session body as a document, keyed by session id.
    ///
    /// The first failure aborts the whole call.
    fn embed_sessions(
        &self,
        sessions: &HashMap<String, String>,
    ) -> Result<HashMap<String, Vec<f32>>, EmbedderError> {
        sessions
            .iter()
            .map(|(id, body)| Ok((id.clone(), self.embed_document(body)?)))
            .collect()
    }
}

/// Rescale `vec` to unit Euclidean length in place.
///
/// An all-zero vector has no direction and is left unchanged.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq > 0.0 {
        let norm = norm_sq.sqrt();
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_prefixes() {
        assert_eq!(Task::Document.apply("hello"), "search_document: hello");
        assert_eq!(Task::Query.apply("hello"), "search_query: hello");
        assert_eq!(Task::Query.apply(""), "search_query: ");
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_l2_normalize_already_unit() {
        let mut v = vec![0.0, 1.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_error_messages() {
        let err = EmbedderError::TokenizerError("no tokens".into());
        assert_eq!(err.to_string(), "tokenizer error: no tokens");
        assert_eq!(
            EmbedderError::NotSupported.to_string(),
            "nomic embeddings not supported on this build"
        );
    }
}
