// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opaque-blob persistence of the vault container.
//!
//! The store parses container structure but never decrypts; atomicity is the
//! backend's `write_all_atomic` contract.

use std::sync::Arc;

use safevault_core::{PersistenceBackend, VaultError};
use tracing::debug;

use crate::container::VaultContainer;

/// A vault container slot on a persistence backend.
#[derive(Clone)]
pub struct VaultStore {
    backend: Arc<dyn PersistenceBackend>,
    slot: String,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("backend", &self.backend.name())
            .field("slot", &self.slot)
            .finish()
    }
}

impl VaultStore {
    pub fn new(backend: Arc<dyn PersistenceBackend>, slot: impl Into<String>) -> Self {
        Self {
            backend,
            slot: slot.into(),
        }
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Load and structurally validate the container.
    ///
    /// `Ok(None)` means no vault has been created in this slot yet.
    pub async fn load(&self) -> Result<Option<VaultContainer>, VaultError> {
        match self.load_raw().await? {
            Some(bytes) => VaultContainer::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Atomically replace the stored container.
    pub async fn save(&self, container: &VaultContainer) -> Result<(), VaultError> {
        let bytes = container.to_bytes()?;
        self.write(&bytes).await
    }

    /// The stored container bytes, exactly as persisted.
    pub async fn load_raw(&self) -> Result<Option<Vec<u8>>, VaultError> {
        self.backend.read_all(&self.slot).await
    }

    /// Validate `bytes` as a container and atomically persist them unchanged.
    pub async fn save_raw(&self, bytes: &[u8]) -> Result<VaultContainer, VaultError> {
        let container = VaultContainer::from_bytes(bytes)?;
        self.write(bytes).await?;
        Ok(container)
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), VaultError> {
        self.backend.write_all_atomic(&self.slot, bytes).await?;
        debug!(
            backend = self.backend.name(),
            slot = %self.slot,
            bytes = bytes.len(),
            "vault container written"
        );
        Ok(())
    }
}
