//! Binary-safe, whitespace-free token encoding.
//!
//! Every byte string that has to pass through JSON or sit inside a
//! filesystem-backed queue item goes through this codec first, so callers
//! never have to reason about escaping, embedded newlines, or non-UTF-8
//! bytes at the higher layers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{IpcError, Result};

/// Encode arbitrary bytes into a whitespace-free, JSON-safe token.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a token produced by [`encode`] back into its original bytes.
///
/// Returns [`IpcError::MalformedToken`] if the input contains characters
/// outside the URL-safe base64 alphabet or has invalid padding/length.
pub fn decode(token: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|_| IpcError::MalformedToken)
}
