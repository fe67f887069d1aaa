//! llama.cpp embedding handle.
//!
//! [`LlamaEmbedder`] owns a GGUF model, an embeddings-mode context bound to it
//! and a reusable token buffer. Every call into the engine runs inside a
//! [`quiet::Quiet`] scope, which both silences engine diagnostics and
//! serialises all engine access in the process.

mod batch;
mod pooling;
mod quiet;
mod tokenize;

use std::ffi::CString;
use std::path::Path;
use std::ptr::NonNull;

use llama_cpp_sys_2::{llama_context, llama_model, llama_token, llama_vocab};
use tracing::{debug, info};

use crate::embedder::EmbedderError;
use batch::SequenceBatch;
use quiet::Quiet;

/// Maximum tokens per text; also the context length and batch sizes.
pub const MAX_TOKENS: usize = 2048;

/// Offload as many layers as the backend allows.
const GPU_LAYERS: i32 = 99;

/// Engine objects produced by a successful load.
struct Loaded {
    model: NonNull<llama_model>,
    ctx: NonNull<llama_context>,
    vocab: *const llama_vocab,
    n_embd: i32,
}

/// A loaded embedding model.
///
/// Not `Sync`: the token buffer and the context are mutated by every
/// [`embed`](Self::embed) call.
pub struct LlamaEmbedder {
    model: Option<NonNull<llama_model>>,
    ctx: Option<NonNull<llama_context>>,
    // Borrowed from `model`
    vocab: *const llama_vocab,
    n_embd: usize,
    n_threads: u32,
    tokens: Option<Box<[llama_token]>>,
}

// SAFETY: the engine objects are only touched through `&mut self` or in
// `drop`, always under the process-wide engine lock.
unsafe impl Send for LlamaEmbedder {}

impl LlamaEmbedder {
    /// Load a GGUF model from `model_path` and create an embedding context
    /// that uses `n_threads` threads.
    ///
    /// The engine gives no reason for a failed load, so every cause (missing
    /// file, bad format, context allocation) surfaces as
    /// [`EmbedderError::ModelLoadFailed`].
    pub fn load(model_path: &Path, n_threads: u32) -> Result<Self, EmbedderError> {
        if n_threads == 0 {
            return Err(EmbedderError::ModelLoadFailed(
                "thread count must be positive".to_string(),
            ));
        }
        let threads = i32::try_from(n_threads).map_err(|_| {
            EmbedderError::ModelLoadFailed(format!("thread count {n_threads} out of range"))
        })?;
        let c_path = model_path
            .to_str()
            .and_then(|p| CString::new(p).ok())
            .ok_or_else(|| {
                EmbedderError::ModelLoadFailed(format!(
                    "unusable model path: {}",
                    model_path.display()
                ))
            })?;

        info!("Loading embedding model {}", model_path.display());

        let quiet = Quiet::enter();
        let loaded = unsafe { Self::load_quiet(&c_path, threads) };
        quiet.restore();

        let loaded = loaded.ok_or_else(|| {
            EmbedderError::ModelLoadFailed(format!("cannot load {}", model_path.display()))
        })?;

        // Dropping `embedder` on the paths below frees the context and model
        let mut embedder = Self {
            model: Some(loaded.model),
            ctx: Some(loaded.ctx),
            vocab: loaded.vocab,
            n_embd: 0,
            n_threads,
            tokens: Some(vec![0; MAX_TOKENS].into_boxed_slice()),
        };
        if loaded.vocab.is_null() {
            return Err(EmbedderError::ModelLoadFailed(
                "model has no vocabulary".to_string(),
            ));
        }
        embedder.n_embd = match usize::try_from(loaded.n_embd) {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(EmbedderError::ModelLoadFailed(format!(
                    "model reports embedding size {}",
                    loaded.n_embd
                )));
            }
        };

        info!(
            "Embedding model loaded (dim {}, {} threads)",
            embedder.n_embd, n_threads
        );
        Ok(embedder)
    }

    /// Backend init, model load and context creation.
    ///
    /// Returns `None` with nothing leaked when any step fails.
    ///
    /// # Safety
    ///
    /// Caller must hold a [`Quiet`] scope.
    unsafe fn load_quiet(path: &CString, threads: i32) -> Option<Loaded> {
        unsafe {
            llama_cpp_sys_2::llama_backend_init();

            let mut mparams = llama_cpp_sys_2::llama_model_default_params();
            mparams.n_gpu_layers = GPU_LAYERS;
            let model =
                NonNull::new(llama_cpp_sys_2::llama_model_load_from_file(path.as_ptr(), mparams))?;

            let mut cparams = llama_cpp_sys_2::llama_context_default_params();
            cparams.n_ctx = MAX_TOKENS as u32;
            cparams.n_batch = MAX_TOKENS as u32;
            cparams.n_ubatch = MAX_TOKENS as u32;
            cparams.embeddings = true;
            cparams.pooling_type = llama_cpp_sys_2::LLAMA_POOLING_TYPE_MEAN;
            cparams.n_threads = threads;
            cparams.n_threads_batch = threads;

            let Some(ctx) =
                NonNull::new(llama_cpp_sys_2::llama_init_from_model(model.as_ptr(), cparams))
            else {
                llama_cpp_sys_2::llama_model_free(model.as_ptr());
                return None;
            };

            Some(Loaded {
                model,
                ctx,
                vocab: llama_cpp_sys_2::llama_model_get_vocab(model.as_ptr()),
                n_embd: llama_cpp_sys_2::llama_model_n_embd(model.as_ptr()),
            })
        }
    }

    /// Embedding dimensionality, fixed by the model architecture.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.n_embd
    }

    /// Thread count the context was created with.
    #[must_use]
    pub fn threads(&self) -> u32 {
        self.n_threads
    }

    /// Embed `text` and write a unit-length vector into `out[..dimension]`.
    ///
    /// Texts longer than [`MAX_TOKENS`] tokens are truncated to their first
    /// `MAX_TOKENS` tokens. Blank text fails. The contents of `out` are
    /// unspecified on failure.
    pub fn embed(&mut self, text: &str, out: &mut [f32]) -> Result<(), EmbedderError> {
        if out.len() < self.n_embd {
            return Err(EmbedderError::InvalidInput(format!(
                "output buffer holds {} floats, need {}",
                out.len(),
                self.n_embd
            )));
        }
        let (Some(ctx), Some(tokens)) = (self.ctx, self.tokens.as_deref_mut()) else {
            return Err(EmbedderError::InvalidInput("embedder is not loaded".to_string()));
        };
        let out = &mut out[..self.n_embd];

        let quiet = Quiet::enter();
        // SAFETY: the engine lock is held and the handle's pointers are live.
        let result = unsafe {
            tokenize::tokenize(self.vocab, text, tokens).and_then(|n| {
                let batch = SequenceBatch::new(&tokens[..n])?;
                batch.encode(ctx.as_ptr())?;
                pooling::read_pooled(ctx.as_ptr(), out)?;
                Ok(n)
            })
        };
        quiet.restore();

        let n_tokens = result?;
        debug!("Embedded {} bytes as {} tokens", text.len(), n_tokens);
        Ok(())
    }
}

impl Drop for LlamaEmbedder {
    fn drop(&mut self) {
        let quiet = Quiet::enter();
        self.tokens = None;
        self.vocab = std::ptr::null();
        // SAFETY: each pointer is taken out before being freed, so nothing is
        // released twice.
        unsafe {
            if let Some(ctx) = self.ctx.take() {
                llama_cpp_sys_2::llama_free(ctx.as_ptr());
            }
            if let Some(model) = self.model.take() {
                llama_cpp_sys_2::llama_model_free(model.as_ptr());
            }
        }
        quiet.restore();
    }
}

/// Release `embedder`; `None` is a no-op.
pub fn free(embedder: Option<LlamaEmbedder>) {
    drop(embedder);
}

/// Dimension of `embedder`, or 0 for `None`.
#[must_use]
pub fn dimension(embedder: Option<&LlamaEmbedder>) -> usize {
    embedder.map_or(0, LlamaEmbedder::dimension)
}
