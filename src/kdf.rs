//! Password stretching for the vault key.
//!
//! PBKDF2-HMAC-SHA256 with a tunable iteration count. Records written at
//! [`BARE_TOKEN_ITERATIONS`] carry no header; every other count is written
//! into the record token, so raising the default never strands old records.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const MIN_ITERATIONS: u32 = 100_000;
pub const MAX_ITERATIONS: u32 = 10_000_000;
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Iteration count implied by a token without a KDF header. Fixed forever:
/// browser-era records were written this way.
pub const BARE_TOKEN_ITERATIONS: u32 = 100_000;

/// Name of the only supported KDF, as written in record tokens.
pub const PBKDF2_SHA256: &str = "pbkdf2-sha256";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KdfError {
    #[error(
        "KDF iteration count {got} outside {min}..={max}",
        min = MIN_ITERATIONS,
        max = MAX_ITERATIONS
    )]
    IterationsOutOfRange { got: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub(crate) iterations: u32,
}

impl KdfParams {
    pub fn new(iterations: u32) -> Result<Self, KdfError> {
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iterations) {
            return Err(KdfError::IterationsOutOfRange { got: iterations });
        }
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn is_default(&self) -> bool {
        self.iterations == DEFAULT_ITERATIONS
    }

    /// Parameters of a headerless record token.
    pub fn bare_token() -> Self {
        Self {
            iterations: BARE_TOKEN_ITERATIONS,
        }
    }

    /// Whether a record with these parameters is written without a header.
    pub fn is_bare_token(&self) -> bool {
        self.iterations == BARE_TOKEN_ITERATIONS
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// 256-bit AES key stretched from a password. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    pub const LEN: usize = 32;

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

pub fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> DerivedKey {
    let mut key = DerivedKey([0u8; DerivedKey::LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, params.iterations, &mut key.0);
    key
}
