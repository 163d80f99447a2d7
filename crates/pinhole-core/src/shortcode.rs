use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Length of a derived short code, in characters.
pub const CODE_LENGTH: usize = 8;

/// Digest bytes fed to the encoder.
const DIGEST_BYTES: usize = 8;

/// Derives the short code for `url`.
///
/// The code is the URL-safe base64 encoding of the leading bytes of the
/// URL's SHA-256 digest, truncated to [`CODE_LENGTH`] characters. The
/// derivation is deterministic, so the same URL always maps to the same
/// code no matter who submits it, and a code never needs to be stored to
/// be recomputed.
pub fn derive(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut code = URL_SAFE_NO_PAD.encode(&digest[..DIGEST_BYTES]);
    code.truncate(CODE_LENGTH);
    code
}
