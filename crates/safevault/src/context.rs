// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring shared by every command: the configured store, the session over
//! it, and passphrase acquisition.

use safevault_config::SafevaultConfig;
use safevault_core::VaultError;
use safevault_vault::{
    get_passphrase, prompt_passphrase, SessionConfig, UnlockOutcome, VaultSession, VaultStore,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// Supplies the new passphrase for `passwd` without a terminal.
pub const NEW_PASSPHRASE_ENV_VAR: &str = "SAFEVAULT_NEW_PASSPHRASE";

/// Supplies the backup's passphrase for `import --merge` without a terminal.
pub const BACKUP_PASSPHRASE_ENV_VAR: &str = "SAFEVAULT_BACKUP_PASSPHRASE";

pub struct VaultContext {
    pub config: SafevaultConfig,
    pub session: VaultSession,
}

impl VaultContext {
    /// Open the backend named in `[storage]` and build a locked session over it.
    pub async fn open(config: SafevaultConfig) -> Result<Self, VaultError> {
        let backend = safevault_storage::open_backend(&config.storage).await?;
        let store = VaultStore::new(backend, config.storage.slot.clone());
        debug!(
            backend = store.backend_name(),
            slot = store.slot(),
            path = %config.storage.path,
            "vault store opened"
        );
        let session = VaultSession::new(store, SessionConfig::from_config(&config.vault));
        Ok(Self { config, session })
    }

    /// Ask for the passphrase and unlock, treating a missing vault as an error.
    ///
    /// Returns the passphrase for commands that need it again.
    pub async fn unlock(&self) -> Result<SecretString, VaultError> {
        let passphrase = get_passphrase("Vault passphrase: ")?;
        match self.session.unlock(&passphrase).await? {
            UnlockOutcome::Unlocked { .. } => Ok(passphrase),
            UnlockOutcome::Uninitialized => Err(VaultError::VaultAbsent),
        }
    }
}

/// The new passphrase for `passwd`: from the environment, or typed twice.
pub fn new_passphrase() -> Result<SecretString, VaultError> {
    if let Some(passphrase) = env_secret(NEW_PASSPHRASE_ENV_VAR) {
        return Ok(passphrase);
    }
    let first = prompt_passphrase("New passphrase: ")?;
    let second = prompt_passphrase("Confirm new passphrase: ")?;
    if first.expose_secret() != second.expose_secret() {
        return Err(VaultError::InvalidInput(
            "passphrases do not match".to_string(),
        ));
    }
    Ok(first)
}

pub fn backup_passphrase() -> Result<SecretString, VaultError> {
    match env_secret(BACKUP_PASSPHRASE_ENV_VAR) {
        Some(passphrase) => Ok(passphrase),
        None => prompt_passphrase("Backup passphrase: "),
    }
}

fn env_secret(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
}
