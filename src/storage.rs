use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Stored record is not valid UTF-8")]
    InvalidEncoding,
    #[error("Invalid wallet id `{0}`")]
    InvalidWalletId(String),
}

/// Where the vault keeps its single encrypted record.
///
/// Implementations hold text tokens only; they never see plaintext. A
/// `save` replaces any previous record wholesale.
pub trait VaultStore {
    fn save(&mut self, token: &str) -> Result<(), StorageError>;

    fn load(&self) -> Result<Option<String>, StorageError>;

    fn clear(&mut self) -> Result<(), StorageError>;

    fn exists(&self) -> bool;
}

/// Session-scoped store; contents vanish with the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    token: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VaultStore for MemoryStore {
    fn save(&mut self, token: &str) -> Result<(), StorageError> {
        self.token = Some(token.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.token.clone())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.token = None;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.token.is_some()
    }
}

/// Durable store: one `<wallet_id>.vault` file in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    storage_dir: PathBuf,
    wallet_id: String,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(storage_dir: P, wallet_id: &str) -> Result<Self, StorageError> {
        if wallet_id.is_empty()
            || !wallet_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StorageError::InvalidWalletId(wallet_id.to_string()));
        }

        let path = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        Ok(FileStore {
            storage_dir: path,
            wallet_id: wallet_id.to_string(),
        })
    }

    pub fn file_path(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.vault", self.wallet_id))
    }

    fn temp_path(&self) -> PathBuf {
        self.storage_dir.join(format!(".{}.vault.tmp", self.wallet_id))
    }
}

impl VaultStore for FileStore {
    /// Writes to a sibling temp file and renames it over the record so a
    /// crash never leaves a half-written record behind.
    fn save(&mut self, token: &str) -> Result<(), StorageError> {
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(token.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, self.file_path())?;

        debug!(path = %self.file_path().display(), "Saved vault record");
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StorageError> {
        match fs::read(self.file_path()) {
            Ok(data) => String::from_utf8(data)
                .map(Some)
                .map_err(|_| StorageError::InvalidEncoding),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        match fs::remove_file(self.file_path()) {
            Ok(()) => {
                debug!(path = %self.file_path().display(), "Removed vault record");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self) -> bool {
        self.file_path().is_file()
    }
}
