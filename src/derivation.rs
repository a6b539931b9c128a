//! SLIP-0010 hierarchical derivation over the ed25519 curve.
//!
//! Ed25519 has no public-key-only child derivation, so every path component
//! must be hardened. A path such as `m/44'/501'/0'/0'` is walked from the
//! 64-byte BIP-39 seed; the final 32-byte key is the ed25519 secret seed.

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use sha2::Sha512;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha512 = Hmac<Sha512>;

pub const HARDENED_BIT: u32 = 0x8000_0000;

/// HMAC key for master key generation, SLIP-0010 section "Master key generation".
const ED25519_SEED_KEY: &[u8] = b"ed25519 seed";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerivationError {
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("Invalid child number: {0}")]
    InvalidChildNumber(String),
    #[error("Ed25519 supports hardened derivation only, got `{0}`")]
    NonHardenedIndex(String),
    #[error("Child index {0} exceeds the hardened range")]
    IndexOutOfRange(u32),
    #[error("HMAC operation failed")]
    HmacError,
}

/// A private key and chain code at some depth of the tree.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ExtendedKey {
    key: [u8; 32],
    chain_code: [u8; 32],
    #[zeroize(skip)]
    depth: u8,
    #[zeroize(skip)]
    child_number: u32,
}

impl ExtendedKey {
    /// Master key: `HMAC-SHA512(key = "ed25519 seed", data = seed)`.
    pub fn from_seed(seed: &[u8]) -> Result<Self, DerivationError> {
        let mut output = hmac_sha512(ED25519_SEED_KEY, seed)?;
        let extended = Self::from_hmac_output(&output, 0, 0);
        output.zeroize();
        Ok(extended)
    }

    /// Derives the hardened child `index'`. `index` must be below 2^31; the
    /// hardened bit is applied here.
    pub fn derive_hardened_child(&self, index: u32) -> Result<Self, DerivationError> {
        if index >= HARDENED_BIT {
            return Err(DerivationError::IndexOutOfRange(index));
        }
        let child_number = index | HARDENED_BIT;

        // 0x00 || key || ser32(index | 2^31)
        let mut data = [0u8; 37];
        data[1..33].copy_from_slice(&self.key);
        data[33..].copy_from_slice(&child_number.to_be_bytes());

        let result = hmac_sha512(&self.chain_code, &data);
        data.zeroize();
        let mut output = result?;

        let depth = self.depth.checked_add(1).ok_or_else(|| {
            DerivationError::InvalidPath("path deeper than 255 levels".to_string())
        })?;
        let child = Self::from_hmac_output(&output, depth, child_number);
        output.zeroize();
        Ok(child)
    }

    /// The 32-byte secret seed for ed25519 key generation.
    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Child number including the hardened bit; zero for the master key.
    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    fn from_hmac_output(output: &[u8; 64], depth: u8, child_number: u32) -> Self {
        let mut key = [0u8; 32];
        let mut chain_code = [0u8; 32];
        key.copy_from_slice(&output[..32]);
        chain_code.copy_from_slice(&output[32..]);
        Self {
            key,
            chain_code,
            depth,
            child_number,
        }
    }
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<[u8; 64], DerivationError> {
    let mut mac = HmacSha512::new_from_slice(key).map_err(|_| DerivationError::HmacError)?;
    mac.update(data);

    let mut output = [0u8; 64];
    output.copy_from_slice(&mac.finalize().into_bytes());
    Ok(output)
}

/// A fully hardened derivation path. Indices are stored without the
/// hardened bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath {
    indices: Vec<u32>,
}

impl DerivationPath {
    pub fn from_indices(indices: Vec<u32>) -> Result<Self, DerivationError> {
        if let Some(&index) = indices.iter().find(|&&i| i >= HARDENED_BIT) {
            return Err(DerivationError::IndexOutOfRange(index));
        }
        Ok(Self { indices })
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Walks this path starting at `root`.
    pub fn derive(&self, root: &ExtendedKey) -> Result<ExtendedKey, DerivationError> {
        let mut key = root.clone();

        for &index in &self.indices {
            key = key.derive_hardened_child(index)?;
        }

        Ok(key)
    }

    /// Master key from `seed`, then [`derive`](Self::derive).
    pub fn derive_from_seed(&self, seed: &[u8]) -> Result<ExtendedKey, DerivationError> {
        let master = ExtendedKey::from_seed(seed)?;
        self.derive(&master)
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationError;

    /// Accepts `m`, `m/44'/501'/0'/0'` and the `h` hardened suffix.
    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let path = path.trim();
        let mut components = path.split('/');

        if components.next() != Some("m") {
            return Err(DerivationError::InvalidPath(format!(
                "path must start with `m`, got `{path}`"
            )));
        }

        let mut indices = Vec::new();
        for component in components {
            let index_str = component
                .strip_suffix('\'')
                .or_else(|| component.strip_suffix('h'))
                .ok_or_else(|| DerivationError::NonHardenedIndex(component.to_string()))?;

            if index_str.is_empty() || !index_str.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DerivationError::InvalidChildNumber(component.to_string()));
            }
            let index: u32 = index_str
                .parse()
                .map_err(|_| DerivationError::InvalidChildNumber(component.to_string()))?;
            if index >= HARDENED_BIT {
                return Err(DerivationError::IndexOutOfRange(index));
            }
            indices.push(index);
        }

        Ok(Self { indices })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for index in &self.indices {
            write!(f, "/{index}'")?;
        }
        Ok(())
    }
}

/// Account path conventions.
pub mod paths {
    use super::{DerivationError, DerivationPath};

    /// BIP-44 purpose.
    pub const PURPOSE: u32 = 44;

    /// Solana - Coin type 501
    pub const SOLANA: u32 = 501;

    /// `m/44'/coin_type'/account'/0'`, all hardened.
    pub fn account(coin_type: u32, account: u32) -> Result<DerivationPath, DerivationError> {
        DerivationPath::from_indices(vec![PURPOSE, coin_type, account, 0])
    }

    pub fn solana(account: u32) -> Result<DerivationPath, DerivationError> {
        self::account(SOLANA, account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hardened_paths() {
        let path: DerivationPath = "m/44'/501'/0'/0'".parse().unwrap();
        assert_eq!(path.indices(), &[44, 501, 0, 0]);

        let path: DerivationPath = "m/44h/501h/7h".parse().unwrap();
        assert_eq!(path.indices(), &[44, 501, 7]);

        let root: DerivationPath = "m".parse().unwrap();
        assert!(root.indices().is_empty());
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(matches!(
            "44'/0'".parse::<DerivationPath>(),
            Err(DerivationError::InvalidPath(_))
        ));
        assert!(matches!(
            "m/44'/0'/0/0'".parse::<DerivationPath>(),
            Err(DerivationError::NonHardenedIndex(_))
        ));
        assert!(matches!(
            "m/44'/x'".parse::<DerivationPath>(),
            Err(DerivationError::InvalidChildNumber(_))
        ));
        assert!(matches!(
            "m/44'//0'".parse::<DerivationPath>(),
            Err(DerivationError::NonHardenedIndex(_))
        ));
        assert!(matches!(
            "m/2147483648'".parse::<DerivationPath>(),
            Err(DerivationError::IndexOutOfRange(2147483648))
        ));
        assert!("m/+1'".parse::<DerivationPath>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let path = paths::solana(3).unwrap();
        assert_eq!(path.to_string(), "m/44'/501'/3'/0'");
        assert_eq!(path.to_string().parse::<DerivationPath>().unwrap(), path);
    }

    #[test]
    fn account_paths_reject_out_of_range_indices() {
        assert_eq!(
            paths::solana(HARDENED_BIT),
            Err(DerivationError::IndexOutOfRange(HARDENED_BIT))
        );
        assert!(paths::solana(HARDENED_BIT - 1).is_ok());
    }

    // SLIP-0010 test vector 1 for ed25519, seed 000102030405060708090a0b0c0d0e0f.
    #[test]
    fn slip10_vector1() {
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let master = ExtendedKey::from_seed(&seed).unwrap();
        assert_eq!(
            hex::encode(master.secret_bytes()),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );
        assert_eq!(
            hex::encode(master.chain_code()),
            "90046a93de5380a72b5e45010748567d5ea02bbf6522f979e05c0d8d8ca9fffb"
        );

        let child = "m/0'".parse::<DerivationPath>().unwrap().derive(&master).unwrap();
        assert_eq!(
            hex::encode(child.secret_bytes()),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
        assert_eq!(
            hex::encode(child.chain_code()),
            "8b59aa11380b624e81507a27fedda59fea6d0b779a778918a2fd3590e16e9c69"
        );
        assert_eq!(child.depth(), 1);
        assert_eq!(child.child_number(), HARDENED_BIT);
    }

    // SLIP-0010 test vector 2 for ed25519, master key only.
    #[test]
    fn slip10_vector2_master() {
        let seed = hex::decode(
            "fffcf9f6f3f0edeae7e4e1dedbd8d5d2cfccc9c6c3c0bdbab7b4b1aeaba8a5a2\
             9f9c999693908d8a8784817e7b7875726f6c696663605d5a5754514e4b484542",
        )
        .unwrap();
        let master = ExtendedKey::from_seed(&seed).unwrap();
        assert_eq!(
            hex::encode(master.secret_bytes()),
            "171cb88b1b3c1db25add599712e36245d75bc65a1a5c9e18d76f9f2b1eab4012"
        );
        assert_eq!(
            hex::encode(master.chain_code()),
            "ef70a74db9c3a5af931b5fe73ed8e1a53464133654fd55e7a66f8570b8e33c3b"
        );
    }

    #[test]
    fn derivation_is_deterministic_and_path_sensitive() {
        let seed = [0x42u8; 64];
        let a = paths::solana(0).unwrap().derive_from_seed(&seed).unwrap();
        let b = paths::solana(0).unwrap().derive_from_seed(&seed).unwrap();
        let c = paths::solana(1).unwrap().derive_from_seed(&seed).unwrap();
        assert_eq!(a.secret_bytes(), b.secret_bytes());
        assert_ne!(a.secret_bytes(), c.secret_bytes());
        assert_eq!(a.depth(), 4);
    }
}
