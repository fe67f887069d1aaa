//! Pooled embedding extraction and normalization.

use llama_cpp_sys_2::llama_context;

use crate::embedder::{EmbedderError, l2_normalize};

/// Copy the mean-pooled embedding of sequence 0 into `out` and normalize it.
///
/// Falls back to the output at position 0 when the context exposes no
/// per-sequence embedding. Nothing is written on failure.
///
/// # Safety
///
/// `ctx` must be a live context with embeddings enabled, `encode` must have
/// just succeeded on it, and the caller must hold the engine lock.
pub(crate) unsafe fn read_pooled(
    ctx: *mut llama_context,
    out: &mut [f32],
) -> Result<(), EmbedderError> {
    let dim = out.len();
    // SAFETY: the engine returns either null or a buffer of n_embd floats,
    // valid until the next call on `ctx`; `dim` is n_embd.
    let pooled = unsafe { as_slice(llama_cpp_sys_2::llama_get_embeddings_seq(ctx, 0), dim) };
    let src = first_available(pooled, || unsafe {
        as_slice(llama_cpp_sys_2::llama_get_embeddings_ith(ctx, 0), dim)
    })
    .ok_or_else(|| {
        EmbedderError::ExtractionFailed("no pooled or positional embedding".to_string())
    })?;

    out.copy_from_slice(src);
    l2_normalize(out);
    Ok(())
}

unsafe fn as_slice<'a>(ptr: *const f32, len: usize) -> Option<&'a [f32]> {
    // SAFETY: non-null pointers from the engine cover `len` floats.
    (!ptr.is_null()).then(|| unsafe { std::slice::from_raw_parts(ptr, len) })
}

fn first_available<'a>(
    pooled: Option<&'a [f32]>,
    positional: impl FnOnce() -> Option<&'a [f32]>,
) -> Option<&'a [f32]> {
    pooled.or_else(positional)
}
