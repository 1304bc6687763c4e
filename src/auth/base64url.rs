//! Unpadded base64url encoding used for JWT segments.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode raw bytes (or a UTF-8 string via `as_bytes`) as unpadded base64url.
pub fn encode<T: AsRef<[u8]> + ?Sized>(data: &T) -> String {
    URL_SAFE_NO_PAD.encode(data.as_ref())
}
