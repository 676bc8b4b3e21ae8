// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite backend: one row per slot in the `vault_blobs` table.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread, and each replacement runs in its own transaction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use safevault_core::{PersistenceBackend, VaultError};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations::run_migrations;
use crate::validate_key;

/// Persists containers in a SQLite database.
pub struct SqliteBackend {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open (or create) the database at `path` and apply pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                VaultError::storage(format!(
                    "failed to create database directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(&path).await.map_err(VaultError::storage)?;
        let backend = Self {
            conn,
            path: Some(path.clone()),
        };
        backend.initialize().await?;
        restrict_permissions(&path)?;
        debug!(path = ?backend.path, "SQLite vault storage opened");
        Ok(backend)
    }

    /// A private database that disappears with the backend.
    pub async fn open_in_memory() -> Result<Self, VaultError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(VaultError::storage)?;
        let backend = Self { conn, path: None };
        backend.initialize().await?;
        Ok(backend)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn initialize(&self) -> Result<(), VaultError> {
        self.conn
            .call(|conn| -> Result<(), VaultError> {
                conn.execute_batch(
                    "PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = FULL;",
                )
                .map_err(VaultError::storage)?;
                run_migrations(conn)
            })
            .await
            .map_err(flatten_err)
    }
}

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        validate_key(key)?;
        let key = key.to_string();
        self.conn
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT data FROM vault_blobs WHERE slot = ?1",
                    params![key],
                    |row| row.get::<_, Vec<u8>>(0),
                );
                match result {
                    Ok(data) => Ok(Some(data)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    async fn write_all_atomic(&self, key: &str, bytes: &[u8]) -> Result<(), VaultError> {
        validate_key(key)?;
        let slot = key.to_string();
        let data = bytes.to_vec();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO vault_blobs (slot, data, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(slot) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                    params![slot, data, now],
                )?;
                tx.commit()
            })
            .await
            .map_err(map_tr_err)?;
        debug!(slot = key, bytes = bytes.len(), "vault row replaced");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), VaultError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
        VaultError::storage(format!(
            "failed to restrict permissions on '{}': {e}",
            path.display()
        ))
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), VaultError> {
    Ok(())
}

/// Convert tokio-rusqlite errors to storage failures.
fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> VaultError {
    VaultError::storage(format!("vault database error: {e}"))
}

fn flatten_err(e: tokio_rusqlite::Error<VaultError>) -> VaultError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        other => VaultError::storage(format!("vault database error: {other}")),
    }
}
