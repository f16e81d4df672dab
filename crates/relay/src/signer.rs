//! HMAC-SHA256 request signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{RelayError, Result};

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// Signs request bodies with a shared secret, as `sha256=<hex digest>`.
#[derive(Clone)]
pub struct HmacSigner {
    mac: HmacSha256,
}

impl HmacSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| RelayError::Config(format!("invalid HMAC secret: {e}")))?;
        Ok(Self { mac })
    }

    /// Signature of the exact bytes of `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(body);
        format!(
            "{SIGNATURE_PREFIX}{}",
            hex::encode(mac.finalize().into_bytes())
        )
    }

    /// Checks a `sha256=<hex>` signature in constant time.
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        let Some(digest) = signature
            .strip_prefix(SIGNATURE_PREFIX)
            .and_then(|hex_digest| hex::decode(hex_digest).ok())
        else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(body);
        mac.verify_slice(&digest).is_ok()
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}
