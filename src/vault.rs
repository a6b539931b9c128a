//! The encrypted-seed vault and its lock state machine.
//!
//! ```text
//!            create                 lock
//!   Empty ───────────▶ Unlocked ◀────────▶ Locked
//!     ▲                  │        unlock      │
//!     └──────────────────┴────── reset ───────┘
//! ```
//!
//! The vault owns the only copy of the [`VaultState`]; callers observe it
//! through [`Vault::state`] and [`Vault::status`]. Storage is injected at
//! construction, so the vault holds no hidden global state.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{ConfigError, VaultConfig};
use crate::derivation::DerivationError;
use crate::kdf::KdfParams;
use crate::keys::{self, DerivedKeypair};
use crate::mnemonic::{MnemonicError, SecureMnemonic};
use crate::password::{self, PasswordError};
use crate::record::{self, EncryptedVaultRecord, RecordError};
use crate::storage::{StorageError, VaultStore};

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid mnemonic phrase")]
    InvalidMnemonic,
    /// Wrong password or a corrupted record; the two are reported alike.
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Key derivation failed: {0}")]
    DerivationFailure(#[from] DerivationError),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
    #[error("No vault record is stored")]
    NoRecord,
    #[error("A vault record already exists; unlock or reset it first")]
    RecordExists,
    #[error("Vault is locked")]
    Locked,
    #[error("Account {0} has not been derived")]
    UnknownAccount(u32),
    #[error("Invalid vault configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Cryptographic failure: {0}")]
    Crypto(String),
}

impl From<PasswordError> for VaultError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort { min } => VaultError::WeakPassword { min },
            PasswordError::Mismatch => VaultError::PasswordMismatch,
        }
    }
}

impl From<MnemonicError> for VaultError {
    fn from(err: MnemonicError) -> Self {
        match err {
            MnemonicError::InvalidMnemonic => VaultError::InvalidMnemonic,
            MnemonicError::EntropyGenerationFailed => VaultError::Crypto(err.to_string()),
        }
    }
}

/// Secrets held while the vault is unlocked. Dropping this wipes the
/// phrase, its seed and every derived private key.
pub struct UnlockedVault {
    mnemonic: SecureMnemonic,
    seed: Zeroizing<[u8; 64]>,
    keypairs: Vec<DerivedKeypair>,
}

impl UnlockedVault {
    pub fn mnemonic(&self) -> &SecureMnemonic {
        &self.mnemonic
    }

    /// Derived accounts, ordered by account index starting at 0.
    pub fn keypairs(&self) -> &[DerivedKeypair] {
        &self.keypairs
    }
}

impl fmt::Debug for UnlockedVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedVault")
            .field("accounts", &self.keypairs.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum VaultState {
    /// No record has been saved.
    Empty,
    /// A record exists but has not been decrypted this session.
    Locked,
    Unlocked(UnlockedVault),
}

/// Secret-free view of [`VaultState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    Empty,
    Locked,
    Unlocked,
}

impl VaultState {
    pub fn status(&self) -> VaultStatus {
        match self {
            VaultState::Empty => VaultStatus::Empty,
            VaultState::Locked => VaultStatus::Locked,
            VaultState::Unlocked(_) => VaultStatus::Unlocked,
        }
    }
}

/// Single-wallet vault over an injected [`VaultStore`].
///
/// Mutating operations take `&mut self`; callers sharing a vault across
/// tasks must serialize access themselves. `create` and `unlock` run the
/// password KDF and the BIP-39 stretch, so they block for a noticeable
/// fraction of a second.
pub struct Vault<S: VaultStore> {
    store: S,
    config: VaultConfig,
    kdf: KdfParams,
    state: VaultState,
    failed_unlocks: u32,
}

impl<S: VaultStore> Vault<S> {
    /// Starts a session: `Locked` if the store already holds a record,
    /// `Empty` otherwise.
    pub fn open(store: S, config: VaultConfig) -> Result<Self, VaultError> {
        let kdf = config.kdf_params().map_err(ConfigError::from)?;

        let state = if store.exists() {
            VaultState::Locked
        } else {
            VaultState::Empty
        };
        debug!(status = ?state.status(), "Opened vault");

        Ok(Self {
            store,
            config,
            kdf,
            state,
            failed_unlocks: 0,
        })
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn status(&self) -> VaultStatus {
        self.state.status()
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.state, VaultState::Unlocked(_))
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Whether the store currently holds a record.
    pub fn has_record(&self) -> bool {
        self.store.exists()
    }

    /// Consecutive failed unlocks this session; reset by a successful
    /// unlock, create or reset. The vault never locks out on its own.
    pub fn failed_unlock_attempts(&self) -> u32 {
        self.failed_unlocks
    }

    /// Validates the phrase, then behaves as [`create_with_mnemonic`](Self::create_with_mnemonic).
    ///
    /// The password is checked first, so a weak or mismatched password is
    /// rejected without parsing the phrase or running the KDF.
    pub fn create(
        &mut self,
        phrase: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<(), VaultError> {
        self.check_can_create()?;
        password::validate_new_password(password, confirmation, self.config.min_password_length())?;
        let mnemonic = SecureMnemonic::from_phrase(phrase)?;
        self.create_with_mnemonic(mnemonic, password, confirmation)
    }

    /// Encrypts and saves `mnemonic`, replacing any previous record, and
    /// leaves the vault `Unlocked`.
    ///
    /// Allowed from `Empty` and `Unlocked`. From `Locked` this fails with
    /// [`VaultError::RecordExists`]: a record the caller cannot currently
    /// open is only discarded through an explicit [`reset`](Self::reset).
    ///
    /// Nothing is written unless every step succeeds.
    pub fn create_with_mnemonic(
        &mut self,
        mnemonic: SecureMnemonic,
        password: &str,
        confirmation: &str,
    ) -> Result<(), VaultError> {
        self.check_can_create()?;
        password::validate_new_password(password, confirmation, self.config.min_password_length())?;

        let unlocked = self.open_accounts(mnemonic)?;
        let record =
            record::encrypt(&unlocked.mnemonic, password, &self.kdf).map_err(map_record_error)?;
        self.store.save(&record.to_token())?;

        self.failed_unlocks = 0;
        self.state = VaultState::Unlocked(unlocked);
        info!(
            accounts = self.config.initial_accounts,
            kdf_iterations = self.kdf.iterations(),
            "Created vault record"
        );
        Ok(())
    }

    /// Decrypts the stored record with `password`.
    ///
    /// On a wrong password (or a damaged record) the state is unchanged and
    /// the result is [`VaultError::InvalidPassword`]. This holds when the
    /// vault is already unlocked too: the password is checked against the
    /// stored record every time, and a match keeps the current session. If
    /// the store holds no record the result is [`VaultError::NoRecord`] and a
    /// locked vault becomes `Empty`.
    pub fn unlock(&mut self, password: &str) -> Result<(), VaultError> {
        let token = match self.store.load()? {
            Some(token) => token,
            None => {
                if !self.is_unlocked() {
                    self.state = VaultState::Empty;
                }
                return Err(VaultError::NoRecord);
            }
        };
        if !self.is_unlocked() {
            self.state = VaultState::Locked;
        }

        let mnemonic = match EncryptedVaultRecord::from_token(&token)
            .and_then(|record| record::decrypt(&record, password))
        {
            Ok(mnemonic) => mnemonic,
            Err(err) => {
                self.failed_unlocks = self.failed_unlocks.saturating_add(1);
                return Err(map_record_error(err));
            }
        };
        self.failed_unlocks = 0;

        if let VaultState::Unlocked(unlocked) = &self.state {
            if unlocked.mnemonic == mnemonic {
                debug!("Password re-verified for unlocked vault");
                return Ok(());
            }
        }

        let unlocked = self.open_accounts(mnemonic)?;
        self.state = VaultState::Unlocked(unlocked);
        info!(accounts = self.config.initial_accounts, "Vault unlocked");
        Ok(())
    }

    /// Drops the phrase and all derived keys. The stored record is kept.
    pub fn lock(&mut self) {
        if self.is_unlocked() {
            self.state = VaultState::Locked;
            info!("Vault locked");
        }
    }

    /// Deletes the stored record and every in-memory secret.
    ///
    /// Irreversible; confirming the intent is the caller's job. If the store
    /// cannot be cleared the vault is left as it was.
    pub fn reset(&mut self) -> Result<(), VaultError> {
        self.store.clear()?;
        self.state = VaultState::Empty;
        self.failed_unlocks = 0;
        info!("Vault reset");
        Ok(())
    }

    /// Derives the next sequential account and returns it.
    pub fn add_account(&mut self) -> Result<&DerivedKeypair, VaultError> {
        let coin_type = self.config.coin_type;
        let unlocked = match &mut self.state {
            VaultState::Unlocked(unlocked) => unlocked,
            _ => return Err(VaultError::Locked),
        };

        let index = u32::try_from(unlocked.keypairs.len())
            .map_err(|_| DerivationError::IndexOutOfRange(u32::MAX))?;
        let keypair = keys::derive_from_seed(&unlocked.seed[..], coin_type, index)?;
        unlocked.keypairs.push(keypair);

        info!(account_index = index, "Added account");
        Ok(&unlocked.keypairs[unlocked.keypairs.len() - 1])
    }

    pub fn keypairs(&self) -> Result<&[DerivedKeypair], VaultError> {
        Ok(self.unlocked()?.keypairs())
    }

    pub fn keypair(&self, account_index: u32) -> Result<&DerivedKeypair, VaultError> {
        self.unlocked()?
            .keypairs
            .get(account_index as usize)
            .ok_or(VaultError::UnknownAccount(account_index))
    }

    /// The plaintext phrase, for a backup screen.
    pub fn phrase(&self) -> Result<&str, VaultError> {
        Ok(self.unlocked()?.mnemonic.phrase())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn unlocked(&self) -> Result<&UnlockedVault, VaultError> {
        match &self.state {
            VaultState::Unlocked(unlocked) => Ok(unlocked),
            _ => Err(VaultError::Locked),
        }
    }

    fn check_can_create(&self) -> Result<(), VaultError> {
        match self.state {
            VaultState::Locked => Err(VaultError::RecordExists),
            VaultState::Empty | VaultState::Unlocked(_) => Ok(()),
        }
    }

    /// Stretches the phrase once and derives the configured initial accounts.
    fn open_accounts(&self, mnemonic: SecureMnemonic) -> Result<UnlockedVault, VaultError> {
        let seed = mnemonic.to_seed();
        let keypairs = (0..self.config.initial_accounts)
            .map(|index| {
                keys::derive_from_seed(&seed[..], self.config.coin_type, index)
                    .map_err(VaultError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(UnlockedVault {
            mnemonic,
            seed,
            keypairs,
        })
    }
}

impl<S: VaultStore + fmt::Debug> fmt::Debug for Vault<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("store", &self.store)
            .field("state", &self.state)
            .field("failed_unlocks", &self.failed_unlocks)
            .finish_non_exhaustive()
    }
}

fn map_record_error(err: RecordError) -> VaultError {
    match err {
        RecordError::InvalidPassword => {
            warn!("Vault unlock failed: authentication tag mismatch");
            VaultError::InvalidPassword
        }
        RecordError::Malformed(reason) => {
            warn!(%reason, "Stored vault record failed integrity checks");
            VaultError::InvalidPassword
        }
        RecordError::Encryption(reason) => VaultError::Crypto(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";
    const PASSWORD: &str = "correcthorse";

    fn empty_vault() -> Vault<MemoryStore> {
        Vault::open(MemoryStore::new(), VaultConfig::default()).unwrap()
    }

    #[test]
    fn new_store_opens_empty() {
        let vault = empty_vault();
        assert_eq!(vault.status(), VaultStatus::Empty);
        assert!(!vault.has_record());
        assert!(matches!(vault.keypairs(), Err(VaultError::Locked)));
        assert!(matches!(vault.phrase(), Err(VaultError::Locked)));
    }

    #[test]
    fn password_checks_precede_mnemonic_checks() {
        let mut vault = empty_vault();
        assert!(matches!(
            vault.create("not a mnemonic", "short", "short"),
            Err(VaultError::WeakPassword { min: 8 })
        ));
        assert!(matches!(
            vault.create("not a mnemonic", PASSWORD, "correcthorsf"),
            Err(VaultError::PasswordMismatch)
        ));
        assert!(matches!(
            vault.create("not a mnemonic", PASSWORD, PASSWORD),
            Err(VaultError::InvalidMnemonic)
        ));
        assert_eq!(vault.status(), VaultStatus::Empty);
        assert!(!vault.has_record());
    }

    #[test]
    fn create_unlocks_with_initial_account() {
        let mut vault = empty_vault();
        vault.create(ABANDON_ABOUT, PASSWORD, PASSWORD).unwrap();

        assert_eq!(vault.status(), VaultStatus::Unlocked);
        assert!(vault.has_record());
        assert_eq!(vault.phrase().unwrap(), ABANDON_ABOUT);
        let keypairs = vault.keypairs().unwrap();
        assert_eq!(keypairs.len(), 1);
        assert_eq!(
            keypairs[0].public_key_base58(),
            "HAgk14JpMQLgt6rVgv7cBQFJWFto5Dqxi472uT3DKpqk"
        );
    }

    #[test]
    fn lock_keeps_record_and_drops_secrets() {
        let mut vault = empty_vault();
        vault.create(ABANDON_ABOUT, PASSWORD, PASSWORD).unwrap();
        let token = vault.store().load().unwrap();

        vault.lock();
        assert_eq!(vault.status(), VaultStatus::Locked);
        assert!(matches!(vault.keypair(0), Err(VaultError::Locked)));
        assert_eq!(vault.store().load().unwrap(), token);

        vault.lock();
        assert_eq!(vault.status(), VaultStatus::Locked);
    }

    #[test]
    fn failed_unlocks_are_counted_and_reset() {
        let mut vault = empty_vault();
        vault.create(ABANDON_ABOUT, PASSWORD, PASSWORD).unwrap();
        vault.lock();

        for attempt in 1..=2 {
            assert!(matches!(
                vault.unlock("wrong password"),
                Err(VaultError::InvalidPassword)
            ));
            assert_eq!(vault.failed_unlock_attempts(), attempt);
            assert_eq!(vault.status(), VaultStatus::Locked);
        }

        vault.unlock(PASSWORD).unwrap();
        assert_eq!(vault.failed_unlock_attempts(), 0);
    }

    #[test]
    fn unlock_while_unlocked_rechecks_password() {
        let mut vault = empty_vault();
        vault.create(ABANDON_ABOUT, PASSWORD, PASSWORD).unwrap();
        vault.add_account().unwrap();

        assert!(matches!(
            vault.unlock("wrong password"),
            Err(VaultError::InvalidPassword)
        ));
        assert_eq!(vault.status(), VaultStatus::Unlocked);
        assert_eq!(vault.failed_unlock_attempts(), 1);

        // A correct password keeps the running session, added account included.
        vault.unlock(PASSWORD).unwrap();
        assert_eq!(vault.failed_unlock_attempts(), 0);
        assert_eq!(vault.keypairs().unwrap().len(), 2);
    }

    #[test]
    fn create_while_locked_is_refused() {
        let mut vault = empty_vault();
        vault.create(ABANDON_ABOUT, PASSWORD, PASSWORD).unwrap();
        vault.lock();
        let token = vault.store().load().unwrap();

        let other = SecureMnemonic::generate(Default::default()).unwrap();
        assert!(matches!(
            vault.create(other.phrase(), PASSWORD, PASSWORD),
            Err(VaultError::RecordExists)
        ));
        assert_eq!(vault.store().load().unwrap(), token);
    }

    #[test]
    fn add_account_extends_sequentially() {
        let mut vault = empty_vault();
        vault.create(ABANDON_ABOUT, PASSWORD, PASSWORD).unwrap();

        assert_eq!(vault.add_account().unwrap().account_index(), 1);
        assert_eq!(vault.add_account().unwrap().account_index(), 2);
        let keypairs = vault.keypairs().unwrap();
        let mnemonic = SecureMnemonic::from_phrase(ABANDON_ABOUT).unwrap();
        assert_eq!(keypairs[2], keys::derive(&mnemonic, 2).unwrap());
        assert_eq!(keypairs.len(), 3);
        assert_ne!(keypairs[1].public_key_bytes(), keypairs[2].public_key_bytes());
        assert!(matches!(vault.keypair(3), Err(VaultError::UnknownAccount(3))));

        vault.lock();
        assert!(matches!(vault.add_account(), Err(VaultError::Locked)));
    }

    #[test]
    fn open_rejects_weak_kdf_config() {
        let config = VaultConfig {
            kdf_iterations: 10,
            ..VaultConfig::default()
        };
        assert!(matches!(
            Vault::open(MemoryStore::new(), config),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut vault = empty_vault();
        vault.create(ABANDON_ABOUT, PASSWORD, PASSWORD).unwrap();
        let rendered = format!("{vault:?}");
        assert!(rendered.contains("accounts: 1"));
        assert!(!rendered.contains("abandon"));
    }
}
