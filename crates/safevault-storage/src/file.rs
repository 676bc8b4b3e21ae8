// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File system backend with atomic write semantics (write-to-temp-then-rename).
//!
//! Writes follow this sequence:
//!
//! 1. Write data to `.<slot>.svault.tmp` in the same directory (mode 0600 on Unix)
//! 2. `fsync` the temporary file
//! 3. Rename it over `<slot>.svault`
//! 4. `fsync` the directory so the rename itself is durable
//!
//! The temporary file is removed if any step before the rename fails. Once the
//! rename has happened the new container is live, so a failed directory sync
//! is logged and the write still reports success.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use safevault_core::{PersistenceBackend, VaultError};
use tracing::{debug, warn};

use crate::validate_key;

/// Extension of vault files on disk.
pub const FILE_EXTENSION: &str = "svault";

/// One container file per slot inside a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    directory: PathBuf,
}

impl FileBackend {
    /// The directory is created on first write.
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the container file for `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, VaultError> {
        validate_key(key)?;
        Ok(self.directory.join(format!("{key}.{FILE_EXTENSION}")))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!(".{key}.{FILE_EXTENSION}.tmp"))
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(format!("failed to read '{}'", path.display()), e)),
        }
    }

    async fn write_all_atomic(&self, key: &str, bytes: &[u8]) -> Result<(), VaultError> {
        let final_path = self.path_for(key)?;
        let temp_path = self.temp_path(key);
        let directory = self.directory.clone();
        let data = bytes.to_vec();

        tokio::task::spawn_blocking(move || {
            let result = write_replace(&directory, &temp_path, &final_path, &data, sync_directory);
            if result.is_err() && temp_path.exists() {
                if let Err(e) = fs::remove_file(&temp_path) {
                    warn!(path = %temp_path.display(), error = %e, "failed to remove temporary vault file");
                }
            }
            result
        })
        .await
        .map_err(|e| VaultError::Internal(format!("file write task failed: {e}")))??;

        debug!(slot = key, bytes = bytes.len(), "vault file replaced");
        Ok(())
    }
}

fn write_replace(
    directory: &Path,
    temp_path: &Path,
    final_path: &Path,
    data: &[u8],
    sync_dir: fn(&Path) -> std::io::Result<()>,
) -> Result<(), VaultError> {
    create_private_dir(directory)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(temp_path).map_err(|e| {
        io_error(
            format!("failed to create temporary file '{}'", temp_path.display()),
            e,
        )
    })?;

    file.write_all(data).map_err(|e| {
        io_error(
            format!("failed to write temporary file '{}'", temp_path.display()),
            e,
        )
    })?;
    file.sync_all()
        .map_err(|e| io_error("failed to sync temporary file", e))?;
    drop(file);

    fs::rename(temp_path, final_path).map_err(|e| {
        io_error(
            format!(
                "failed to rename '{}' to '{}'",
                temp_path.display(),
                final_path.display()
            ),
            e,
        )
    })?;

    // The new container is in place from here on; the caller must see success.
    if let Err(e) = sync_dir(directory) {
        warn!(
            directory = %directory.display(),
            error = %e,
            "vault file replaced but directory sync failed"
        );
    }
    Ok(())
}

fn create_private_dir(directory: &Path) -> Result<(), VaultError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(directory).map_err(|e| {
        io_error(
            format!("failed to create vault directory '{}'", directory.display()),
            e,
        )
    })
}

#[cfg(unix)]
fn sync_directory(directory: &Path) -> std::io::Result<()> {
    File::open(directory)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_directory: &Path) -> std::io::Result<()> {
    // Directories cannot be opened for sync here; the rename is still atomic.
    Ok(())
}

fn io_error(context: impl Into<String>, err: std::io::Error) -> VaultError {
    VaultError::storage(format!("{}: {err}", context.into()))
}
