//! The persisted vault record.
//!
//! ```text
//! record := salt(16) || nonce(12) || ciphertext(variable) || tag(16)
//! ```
//!
//! The key is PBKDF2-HMAC-SHA256(password, salt) and the cipher is
//! AES-256-GCM without associated data. For storage the record is rendered
//! as a text token: plain base58 for 100 000 iterations (the count every
//! headerless token implies, whatever the current default),
//! `pbkdf2-sha256:<iterations>:<base58>` otherwise.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::kdf::{derive_key, KdfParams, PBKDF2_SHA256};
use crate::mnemonic::SecureMnemonic;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Smallest well-formed record: header plus tag over an empty plaintext.
pub const MIN_RECORD_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Tag verification failed: wrong password or tampered ciphertext.
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Malformed vault record: {0}")]
    Malformed(String),
    #[error("Failed to encrypt data: {0}")]
    Encryption(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedVaultRecord {
    kdf: KdfParams,
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    /// Ciphertext with the GCM tag appended.
    ciphertext: Vec<u8>,
}

impl EncryptedVaultRecord {
    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(SALT_LEN + NONCE_LEN + self.ciphertext.len());
        data.extend_from_slice(&self.salt);
        data.extend_from_slice(&self.nonce);
        data.extend_from_slice(&self.ciphertext);
        data
    }

    /// Splits raw record bytes. `kdf` is whatever the token header said, or
    /// [`KdfParams::bare_token`] for a headerless token.
    pub fn from_bytes(data: &[u8], kdf: KdfParams) -> Result<Self, RecordError> {
        if data.len() < MIN_RECORD_LEN {
            return Err(RecordError::Malformed(format!(
                "expected at least {MIN_RECORD_LEN} bytes, got {}",
                data.len()
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        salt.copy_from_slice(&data[..SALT_LEN]);
        nonce.copy_from_slice(&data[SALT_LEN..SALT_LEN + NONCE_LEN]);

        Ok(Self {
            kdf,
            salt,
            nonce,
            ciphertext: data[SALT_LEN + NONCE_LEN..].to_vec(),
        })
    }

    pub fn to_token(&self) -> String {
        let encoded = bs58::encode(self.to_bytes()).into_string();
        if self.kdf.is_bare_token() {
            encoded
        } else {
            format!("{PBKDF2_SHA256}:{}:{encoded}", self.kdf.iterations())
        }
    }

    pub fn from_token(token: &str) -> Result<Self, RecordError> {
        let token = token.trim();

        let (kdf, encoded) = match token.split_once(':') {
            None => (KdfParams::bare_token(), token),
            Some((name, rest)) => {
                if name != PBKDF2_SHA256 {
                    return Err(RecordError::Malformed(format!("unknown KDF `{name}`")));
                }
                let (iterations, encoded) = rest
                    .split_once(':')
                    .ok_or_else(|| RecordError::Malformed("truncated KDF header".to_string()))?;
                let iterations: u32 = iterations.parse().map_err(|_| {
                    RecordError::Malformed(format!("bad iteration count `{iterations}`"))
                })?;
                let kdf =
                    KdfParams::new(iterations).map_err(|e| RecordError::Malformed(e.to_string()))?;
                (kdf, encoded)
            }
        };

        let data = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| RecordError::Malformed(format!("bad base58: {e}")))?;
        Self::from_bytes(&data, kdf)
    }
}

impl fmt::Debug for EncryptedVaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedVaultRecord")
            .field("kdf", &self.kdf)
            .field("salt", &hex::encode(self.salt))
            .field("nonce", &hex::encode(self.nonce))
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Encrypts the phrase under `password` with a fresh salt and nonce.
pub fn encrypt(
    mnemonic: &SecureMnemonic,
    password: &str,
    kdf: &KdfParams,
) -> Result<EncryptedVaultRecord, RecordError> {
    encrypt_with_rng(&mut OsRng, mnemonic, password, kdf)
}

pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
    mnemonic: &SecureMnemonic,
    password: &str,
    kdf: &KdfParams,
) -> Result<EncryptedVaultRecord, RecordError> {
    let mut salt = [0u8; SALT_LEN];
    rng.try_fill_bytes(&mut salt)
        .map_err(|e| RecordError::Encryption(format!("salt generation failed: {e}")))?;

    let key = derive_key(password, &salt, kdf);

    let mut nonce = [0u8; NONCE_LEN];
    rng.try_fill_bytes(&mut nonce)
        .map_err(|e| RecordError::Encryption(format!("nonce generation failed: {e}")))?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| RecordError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), mnemonic.phrase().as_bytes())
        .map_err(|_| RecordError::Encryption("AES-GCM encryption failed".to_string()))?;

    Ok(EncryptedVaultRecord {
        kdf: *kdf,
        salt,
        nonce,
        ciphertext,
    })
}

/// Decrypts and re-validates the phrase.
///
/// Any authentication failure is [`RecordError::InvalidPassword`]; a wrong
/// password and a corrupted record are indistinguishable here.
pub fn decrypt(record: &EncryptedVaultRecord, password: &str) -> Result<SecureMnemonic, RecordError> {
    let key = derive_key(password, &record.salt, &record.kdf);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| RecordError::Encryption(e.to_string()))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&record.nonce), record.ciphertext.as_slice())
            .map_err(|_| RecordError::InvalidPassword)?,
    );

    let phrase = std::str::from_utf8(&plaintext).map_err(|_| RecordError::InvalidPassword)?;
    SecureMnemonic::from_phrase(phrase)
        .map_err(|_| RecordError::Malformed("decrypted phrase is not a valid mnemonic".to_string()))
}
