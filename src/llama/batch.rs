//! Single-sequence inference batch.

use llama_cpp_sys_2::{llama_batch, llama_context, llama_pos, llama_token};

use crate::embedder::EmbedderError;

/// An engine batch holding one sequence, freed on drop.
pub(crate) struct SequenceBatch {
    raw: llama_batch,
}

impl SequenceBatch {
    /// Allocate a batch sized to `tokens` and fill it as sequence 0, with
    /// output requested at every position.
    pub(crate) fn new(tokens: &[llama_token]) -> Result<Self, EmbedderError> {
        let n_tokens = i32::try_from(tokens.len())
            .map_err(|_| EmbedderError::InvalidInput("too many tokens for one batch".to_string()))?;
        if n_tokens == 0 {
            return Err(EmbedderError::InvalidInput("empty batch".to_string()));
        }

        // SAFETY: plain allocation; ownership is taken by `Self` right away.
        let raw = unsafe { llama_cpp_sys_2::llama_batch_init(n_tokens, 0, 1) };
        let mut batch = Self { raw };

        // SAFETY: llama_batch_init allocated `n_tokens` slots for every array
        // and one seq_id entry per slot.
        unsafe {
            for (i, &token) in tokens.iter().enumerate() {
                *batch.raw.token.add(i) = token;
                *batch.raw.pos.add(i) = i as llama_pos;
                *batch.raw.n_seq_id.add(i) = 1;
                *(*batch.raw.seq_id.add(i)) = 0;
                *batch.raw.logits.add(i) = 1;
            }
        }
        batch.raw.n_tokens = n_tokens;
        Ok(batch)
    }

    pub(crate) fn len(&self) -> usize {
        self.raw.n_tokens as usize
    }

    /// Run one encoder forward pass over the batch.
    ///
    /// # Safety
    ///
    /// `ctx` must be a live context and the caller must hold the engine lock.
    pub(crate) unsafe fn encode(&self, ctx: *mut llama_context) -> Result<(), EmbedderError> {
        // SAFETY: the batch is fully initialised; `ctx` is live per contract.
        let rc = unsafe { llama_cpp_sys_2::llama_encode(ctx, self.raw) };
        if rc != 0 {
            return Err(EmbedderError::InferenceFailed(format!(
                "encode returned {rc} for {} tokens",
                self.len()
            )));
        }
        Ok(())
    }
}

impl Drop for SequenceBatch {
    fn drop(&mut self) {
        // SAFETY: `raw` came from llama_batch_init and is freed exactly once.
        unsafe { llama_cpp_sys_2::llama_batch_free(self.raw) };
    }
}
