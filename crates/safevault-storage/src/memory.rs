// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Volatile in-process backend for embedding and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use safevault_core::{PersistenceBackend, VaultError};
use tokio::sync::RwLock;

/// Keeps container bytes in a map. Replacing a value under the write lock
/// is atomic with respect to readers.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots holding data.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn write_all_atomic(&self, key: &str, bytes: &[u8]) -> Result<(), VaultError> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
