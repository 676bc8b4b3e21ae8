// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence backend trait for encrypted vault containers.

use async_trait::async_trait;

use crate::error::VaultError;

/// Byte-addressable storage holding opaque blobs under string keys.
///
/// Backends never interpret the bytes they store. A filesystem directory, an
/// embedded database table, or an in-memory map all satisfy this contract.
#[async_trait]
pub trait PersistenceBackend: Send + Sync + 'static {
    /// Returns the human-readable name of this backend.
    fn name(&self) -> &str;

    /// Read the full blob stored under `key`, or `None` if nothing was ever written.
    async fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError>;

    /// Replace the blob under `key` atomically.
    ///
    /// A concurrent [`read_all`](Self::read_all) observes either the previous
    /// blob or the new one in full, never a partial write. On failure the
    /// previous blob is left untouched.
    async fn write_all_atomic(&self, key: &str, bytes: &[u8]) -> Result<(), VaultError>;
}
