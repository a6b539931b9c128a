use bip39::Mnemonic;
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha512;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Number of words in a generated phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MnemonicStrength {
    #[default]
    Words12,
    Words15,
    Words18,
    Words21,
    Words24,
}

impl MnemonicStrength {
    fn to_entropy_bits(self) -> usize {
        match self {
            MnemonicStrength::Words12 => 128,
            MnemonicStrength::Words15 => 160,
            MnemonicStrength::Words18 => 192,
            MnemonicStrength::Words21 => 224,
            MnemonicStrength::Words24 => 256,
        }
    }
}

#[derive(Debug, Error)]
pub enum MnemonicError {
    #[error("Invalid mnemonic phrase")]
    InvalidMnemonic,
    #[error("Failed to generate entropy")]
    EntropyGenerationFailed,
}

const SEED_ROUNDS: u32 = 2048;
const SEED_SALT: &[u8] = b"mnemonic";

/// A validated BIP-39 phrase.
///
/// Only the normalized phrase is kept, and it is wiped when the value is
/// dropped. The type is deliberately neither `Clone` nor `Debug`.
pub struct SecureMnemonic {
    phrase: Zeroizing<String>,
}

impl SecureMnemonic {
    pub fn generate(strength: MnemonicStrength) -> Result<Self, MnemonicError> {
        let entropy_bytes = strength.to_entropy_bits() / 8;

        let mut entropy = generate_entropy(entropy_bytes)?;
        let result = Mnemonic::from_entropy(&entropy);
        entropy.zeroize();

        let mnemonic = result.map_err(|_| MnemonicError::EntropyGenerationFailed)?;
        Ok(Self {
            phrase: Zeroizing::new(mnemonic.to_string()),
        })
    }

    /// Validates `phrase` against the English wordlist and checksum.
    ///
    /// Surrounding whitespace and runs of spaces between words are tolerated;
    /// the stored phrase is single-space separated. Words are matched
    /// case-sensitively, so `Abandon` is not a wordlist word.
    pub fn from_phrase(phrase: &str) -> Result<Self, MnemonicError> {
        let normalized = Zeroizing::new(phrase.split_whitespace().collect::<Vec<_>>().join(" "));

        match Mnemonic::parse_normalized(&normalized) {
            Ok(_) => Ok(Self { phrase: normalized }),
            Err(_) => Err(MnemonicError::InvalidMnemonic),
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split(' ').count()
    }

    /// Stretches the phrase into the 64-byte BIP-39 seed with an empty
    /// passphrase: PBKDF2-HMAC-SHA512, 2048 rounds, salt `"mnemonic"`.
    pub fn to_seed(&self) -> Zeroizing<[u8; 64]> {
        let mut seed = Zeroizing::new([0u8; 64]);
        pbkdf2_hmac::<Sha512>(self.phrase.as_bytes(), SEED_SALT, SEED_ROUNDS, &mut seed[..]);
        seed
    }
}

impl PartialEq for SecureMnemonic {
    fn eq(&self, other: &Self) -> bool {
        self.phrase.as_str() == other.phrase.as_str()
    }
}

impl Eq for SecureMnemonic {}

pub fn generate_entropy(byte_length: usize) -> Result<Vec<u8>, MnemonicError> {
    let mut bytes = vec![0u8; byte_length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| MnemonicError::EntropyGenerationFailed)?;
    Ok(bytes)
}
