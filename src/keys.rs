use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::derivation::{paths, DerivationError};
use crate::mnemonic::SecureMnemonic;

/// An account keypair derived from a mnemonic at `m/44'/coin'/account_index'/0'`.
///
/// The signing key is wiped on drop.
pub struct DerivedKeypair {
    account_index: u32,
    signing_key: SigningKey,
}

impl DerivedKeypair {
    /// Expands a 32-byte ed25519 secret seed into a keypair.
    pub fn from_seed(account_index: u32, secret: &[u8; 32]) -> Self {
        Self {
            account_index,
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn account_index(&self) -> u32 {
        self.account_index
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public_key().to_bytes()
    }

    /// The account address as Solana tooling displays it.
    pub fn public_key_base58(&self) -> String {
        bs58::encode(self.public_key_bytes()).into_string()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// 64 bytes: secret seed followed by the public key.
    pub fn private_key_bytes(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }

    /// Base58 of [`private_key_bytes`](Self::private_key_bytes), the format
    /// wallets import.
    pub fn secret_key_base58(&self) -> Zeroizing<String> {
        Zeroizing::new(bs58::encode(&self.private_key_bytes()[..]).into_string())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.public_key().verify(message, signature).is_ok()
    }
}

impl PartialEq for DerivedKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.account_index == other.account_index
            && self.signing_key.to_bytes() == other.signing_key.to_bytes()
    }
}

impl Eq for DerivedKeypair {}

impl fmt::Debug for DerivedKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeypair")
            .field("account_index", &self.account_index)
            .field("public_key", &self.public_key_base58())
            .finish_non_exhaustive()
    }
}

/// Derives the Solana account keypair for `account_index`.
pub fn derive(
    mnemonic: &SecureMnemonic,
    account_index: u32,
) -> Result<DerivedKeypair, DerivationError> {
    derive_for_coin(mnemonic, paths::SOLANA, account_index)
}

/// Derives the keypair at `m/44'/coin_type'/account_index'/0'`.
///
/// Pure and deterministic. The BIP-39 stretch makes this CPU-bound, so keep
/// it off latency-sensitive threads; callers deriving many accounts should
/// stretch once and use [`derive_from_seed`].
pub fn derive_for_coin(
    mnemonic: &SecureMnemonic,
    coin_type: u32,
    account_index: u32,
) -> Result<DerivedKeypair, DerivationError> {
    derive_from_seed(&mnemonic.to_seed()[..], coin_type, account_index)
}

/// Walks `m/44'/coin_type'/account_index'/0'` from a 64-byte BIP-39 seed.
pub fn derive_from_seed(
    seed: &[u8],
    coin_type: u32,
    account_index: u32,
) -> Result<DerivedKeypair, DerivationError> {
    let path = paths::account(coin_type, account_index)?;
    let extended = path.derive_from_seed(seed)?;

    let keypair = DerivedKeypair::from_seed(account_index, extended.secret_bytes());
    debug!(
        %path,
        public_key = %keypair.public_key_base58(),
        "Derived account keypair"
    );
    Ok(keypair)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

    fn mnemonic() -> SecureMnemonic {
        SecureMnemonic::from_phrase(ABANDON_ABOUT).unwrap()
    }

    #[test]
    fn golden_account_zero() {
        let keypair = derive(&mnemonic(), 0).unwrap();
        assert_eq!(keypair.account_index(), 0);
        assert_eq!(
            keypair.public_key_base58(),
            "HAgk14JpMQLgt6rVgv7cBQFJWFto5Dqxi472uT3DKpqk"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let m = mnemonic();
        for index in [0, 1, 42] {
            let a = derive(&m, index).unwrap();
            let b = derive(&m, index).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.private_key_bytes()[..], b.private_key_bytes()[..]);
        }
    }

    #[test]
    fn distinct_accounts_have_distinct_keys() {
        let m = mnemonic();
        let keys: Vec<[u8; 32]> = (0..5)
            .map(|i| derive(&m, i).unwrap().public_key_bytes())
            .collect();
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                assert_ne!(keys[i], keys[j]);
            }
        }
    }

    #[test]
    fn seed_walk_matches_mnemonic_walk() {
        let m = mnemonic();
        let seed = m.to_seed();
        for index in [0, 3] {
            assert_eq!(
                derive_from_seed(&seed[..], paths::SOLANA, index).unwrap(),
                derive(&m, index).unwrap()
            );
        }
        assert_eq!(
            derive_from_seed(&seed[..], paths::SOLANA, 0)
                .unwrap()
                .public_key_base58(),
            "HAgk14JpMQLgt6rVgv7cBQFJWFto5Dqxi472uT3DKpqk"
        );
    }

    #[test]
    fn coin_type_changes_keys() {
        let m = mnemonic();
        let solana = derive_for_coin(&m, paths::SOLANA, 0).unwrap();
        let other = derive_for_coin(&m, 0, 0).unwrap();
        assert_ne!(solana.public_key_bytes(), other.public_key_bytes());
    }

    #[test]
    fn private_key_bytes_embed_public_key() {
        let keypair = derive(&mnemonic(), 0).unwrap();
        let bytes = keypair.private_key_bytes();
        assert_eq!(bytes[32..], keypair.public_key_bytes());

        let decoded = bs58::decode(keypair.secret_key_base58().as_str())
            .into_vec()
            .unwrap();
        assert_eq!(decoded, bytes[..]);
    }

    #[test]
    fn signatures_verify_under_own_key_only() {
        let m = mnemonic();
        let a = derive(&m, 0).unwrap();
        let b = derive(&m, 1).unwrap();
        let signature = a.sign(b"transfer 1 SOL");
        assert!(a.verify(b"transfer 1 SOL", &signature));
        assert!(!a.verify(b"transfer 2 SOL", &signature));
        assert!(!b.verify(b"transfer 1 SOL", &signature));
    }

    #[test]
    fn out_of_range_index_fails() {
        assert!(matches!(
            derive(&mnemonic(), 0x8000_0000),
            Err(DerivationError::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn debug_output_hides_secret() {
        let keypair = derive(&mnemonic(), 0).unwrap();
        let rendered = format!("{keypair:?}");
        assert!(rendered.contains("HAgk14JpMQLgt6rVgv7cBQFJWFto5Dqxi472uT3DKpqk"));
        assert!(!rendered.contains(keypair.secret_key_base58().as_str()));
    }
}
