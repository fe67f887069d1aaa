//! Bounded tokenization into the handle's scratch buffer.

use std::ffi::c_char;

use llama_cpp_sys_2::{llama_token, llama_vocab};

use crate::embedder::EmbedderError;

/// Tokenize `text` with the model vocabulary into `scratch`.
///
/// Adds the model's leading special token and does not parse special-token
/// text. Returns the number of tokens written.
///
/// # Safety
///
/// `vocab` must point to the vocabulary of a live model and the caller must
/// hold the engine lock.
pub(crate) unsafe fn tokenize(
    vocab: *const llama_vocab,
    text: &str,
    scratch: &mut [llama_token],
) -> Result<usize, EmbedderError> {
    // Whitespace-only text has no content tokens, only the special markers
    if text.trim().is_empty() {
        return Err(EmbedderError::TokenizerError(
            "text produced no tokens".to_string(),
        ));
    }
    let text_len = i32::try_from(text.len())
        .map_err(|_| EmbedderError::TokenizerError("text too long to tokenize".to_string()))?;

    fill_bounded(scratch, |buf| {
        let capacity = i32::try_from(buf.len()).unwrap_or(i32::MAX);
        // SAFETY: `text` and `buf` are valid for the lengths passed; `vocab`
        // is live per the caller's contract.
        unsafe {
            llama_cpp_sys_2::llama_tokenize(
                vocab,
                text.as_ptr().cast::<c_char>(),
                text_len,
                buf.as_mut_ptr(),
                capacity,
                true,
                false,
            )
        }
    })
}

/// Run `tokenize_into` against `scratch`, recovering from overflow.
///
/// `tokenize_into` follows the llama.cpp convention: it returns the token
/// count, or the negated required capacity when the buffer is too small. On
/// overflow the text is tokenized again into an exactly sized temporary and
/// the first `scratch.len()` tokens are kept.
pub(crate) fn fill_bounded<F>(
    scratch: &mut [llama_token],
    mut tokenize_into: F,
) -> Result<usize, EmbedderError>
where
    F: FnMut(&mut [llama_token]) -> i32,
{
    let first = tokenize_into(scratch);

    let n_tokens = if first >= 0 {
        first as usize
    } else {
        let required = first.unsigned_abs() as usize;
        let mut overflow: Vec<llama_token> = Vec::new();
        overflow.try_reserve_exact(required).map_err(|e| {
            EmbedderError::TokenizerError(format!("cannot allocate {required} tokens: {e}"))
        })?;
        overflow.resize(required, 0);

        let actual = tokenize_into(&mut overflow);
        if actual < 0 {
            return Err(EmbedderError::TokenizerError(
                "re-tokenization after overflow failed".to_string(),
            ));
        }

        let kept = (actual as usize).min(scratch.len());
        scratch[..kept].copy_from_slice(&overflow[..kept]);
        kept
    };

    if n_tokens == 0 {
        return Err(EmbedderError::TokenizerError(
            "text produced no tokens".to_string(),
        ));
    }
    Ok(n_tokens.min(scratch.len()))
}
