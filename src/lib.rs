//! # rekal-embed — local text embeddings on llama.cpp
//!
//! Loads a nomic-embed-text GGUF model into llama.cpp and turns text into
//! unit-length, mean-pooled embedding vectors for similarity search.
//!
//! ## Architecture
//!
//! - **[`config`]** — Configuration loading, validation, and model path resolution
//! - **[`embedder`]** — `Embedder` trait, nomic task prefixes, mock embedder, model download
//! - **`llama`** — llama.cpp handle: load, bounded tokenization, encode, pooling
//!   (`llama` feature, on by default)

pub mod config;
pub mod embedder;
#[cfg(feature = "llama")]
pub mod llama;
