use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::derivation::paths;
use crate::kdf::{KdfError, KdfParams, DEFAULT_ITERATIONS};
use crate::password::MIN_PASSWORD_LENGTH;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Kdf(#[from] KdfError),
}

/// Vault tuning. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// PBKDF2 iterations for newly written records.
    pub kdf_iterations: u32,
    /// Raised to 8 if set lower.
    pub min_password_length: usize,
    /// SLIP-0044 coin type in `m/44'/coin'/account'/0'`.
    pub coin_type: u32,
    /// Accounts derived right after create or unlock.
    pub initial_accounts: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_ITERATIONS,
            min_password_length: MIN_PASSWORD_LENGTH,
            coin_type: paths::SOLANA,
            initial_accounts: 1,
        }
    }
}

impl VaultConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.kdf_params()?;
        Ok(())
    }

    pub fn kdf_params(&self) -> Result<KdfParams, KdfError> {
        KdfParams::new(self.kdf_iterations)
    }

    pub fn min_password_length(&self) -> usize {
        self.min_password_length.max(MIN_PASSWORD_LENGTH)
    }
}
