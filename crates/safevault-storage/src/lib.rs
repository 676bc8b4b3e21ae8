// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence backends for SafeVault.
//!
//! Every backend stores opaque container bytes under a slot key and offers
//! the same atomic-replace guarantee: a reader sees the previous bytes or the
//! new bytes, never a mix.

pub mod file;
pub mod memory;
pub mod migrations;
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;

use safevault_config::model::{StorageBackendKind, StorageConfig};
use safevault_core::{PersistenceBackend, VaultError};

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// File name of the SQLite database inside `storage.path`.
pub const SQLITE_FILE_NAME: &str = "safevault.db";

/// Open the backend selected by the `[storage]` config section.
pub async fn open_backend(
    config: &StorageConfig,
) -> Result<Arc<dyn PersistenceBackend>, VaultError> {
    let dir = Path::new(&config.path);
    match config.backend {
        StorageBackendKind::File => Ok(Arc::new(FileBackend::new(dir))),
        StorageBackendKind::Sqlite => {
            let backend = SqliteBackend::open(dir.join(SQLITE_FILE_NAME)).await?;
            Ok(Arc::new(backend))
        }
    }
}

/// Reject slot keys that could escape the storage directory.
pub(crate) fn validate_key(key: &str) -> Result<(), VaultError> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(VaultError::InvalidInput(format!(
            "slot `{key}` must be non-empty and contain only ASCII letters, digits, `-` or `_`"
        )));
    }
    Ok(())
}
