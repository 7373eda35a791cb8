//! Request fingerprinting for deterministic cache keys
//!
//! A fingerprint is the SHA-256 of `"{method}:{path}:"` followed by the raw
//! request body. Headers and the query string never take part.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::{ChameleonError, Result};

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Hex characters shown in log lines
const SHORT_LEN: usize = 16;

/// Content hash identifying a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Lowercase hex encoding, used as the storage key
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Leading hex characters for log output
    #[must_use]
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_LEN);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = ChameleonError;

    fn from_str(s: &str) -> Result<Self> {
        let mut digest = [0u8; 32];
        hex::decode_to_slice(s, &mut digest)
            .map_err(|e| ChameleonError::Other(format!("invalid fingerprint {s:?}: {e}")))?;
        Ok(Self(digest))
    }
}

fn hasher_for(method: &str, path: &str) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    hasher.update(b":");
    hasher
}

/// Fingerprint a request whose body is read to exhaustion from `body`
///
/// # Errors
///
/// Returns [`ChameleonError::HashFailure`] if the body cannot be fully read
pub fn fingerprint_reader<R: Read>(method: &str, path: &str, body: Option<R>) -> Result<Fingerprint> {
    let mut hasher = hasher_for(method, path);

    if let Some(mut body) = body {
        io::copy(&mut body, &mut hasher).map_err(ChameleonError::HashFailure)?;
    }

    Ok(Fingerprint(hasher.finalize().into()))
}

/// Fingerprint a request with an already-buffered body
#[must_use]
pub fn fingerprint_request(method: &str, path: &str, body: &[u8]) -> Fingerprint {
    let mut hasher = hasher_for(method, path);
    hasher.update(body);
    Fingerprint(hasher.finalize().into())
}
