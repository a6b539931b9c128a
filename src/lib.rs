pub mod config;
pub mod derivation;
pub mod kdf;
pub mod keys;
pub mod mnemonic;
pub mod password;
pub mod record;
pub mod storage;
pub mod vault;

pub use config::{ConfigError, VaultConfig};
pub use derivation::{paths, DerivationError, DerivationPath, ExtendedKey};
pub use kdf::{KdfError, KdfParams};
pub use keys::{derive, derive_for_coin, derive_from_seed, DerivedKeypair};
pub use mnemonic::{generate_entropy, MnemonicError, MnemonicStrength, SecureMnemonic};
pub use record::{decrypt, encrypt, EncryptedVaultRecord, RecordError};
pub use storage::{FileStore, MemoryStore, StorageError, VaultStore};
pub use vault::{UnlockedVault, Vault, VaultError, VaultState, VaultStatus};
