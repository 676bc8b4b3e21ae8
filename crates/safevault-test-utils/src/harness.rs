// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end vault testing.
//!
//! `TestHarness` assembles a [`VaultSession`] over a chosen backend in a
//! private temp directory, using fast KDF parameters. The directory is
//! removed when the harness is dropped.

use std::sync::Arc;

use safevault_core::{PersistenceBackend, VaultError};
use safevault_storage::{FileBackend, SqliteBackend, SQLITE_FILE_NAME};
use safevault_vault::{SessionConfig, VaultSession, VaultStore};

use crate::failing_backend::FailingBackend;
use crate::fixtures::fast_session_config;

/// Which storage the harness wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessBackend {
    File,
    Sqlite,
    Failing,
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    backend: HarnessBackend,
    slot: String,
    config: SessionConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            backend: HarnessBackend::File,
            slot: "vault".to_string(),
            config: fast_session_config(),
        }
    }

    pub fn backend(mut self, backend: HarnessBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = slot.into();
        self
    }

    /// Override the session config (defaults to fast KDF parameters).
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the harness, creating the temp directory and backend.
    pub async fn build(self) -> Result<TestHarness, VaultError> {
        let temp_dir = tempfile::TempDir::new()?;
        let mut failing = None;
        let backend: Arc<dyn PersistenceBackend> = match self.backend {
            HarnessBackend::File => Arc::new(FileBackend::new(temp_dir.path())),
            HarnessBackend::Sqlite => {
                Arc::new(SqliteBackend::open(temp_dir.path().join(SQLITE_FILE_NAME)).await?)
            }
            HarnessBackend::Failing => {
                let backend = Arc::new(FailingBackend::new());
                failing = Some(Arc::clone(&backend));
                backend
            }
        };

        let store = VaultStore::new(Arc::clone(&backend), self.slot);
        let session = VaultSession::new(store.clone(), self.config);
        tracing::debug!(backend = backend.name(), "test harness ready");

        Ok(TestHarness {
            session,
            store,
            backend,
            failing,
            temp_dir: temp_dir,
        })
    }
}

/// A session over temp storage, plus direct access to what it persists.
pub struct TestHarness {
    pub session: VaultSession,
    pub store: VaultStore,
    pub backend: Arc<dyn PersistenceBackend>,
    /// Set when built with [`HarnessBackend::Failing`].
    pub failing: Option<Arc<FailingBackend>>,
    temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The temp directory backing file and SQLite storage.
    pub fn dir(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Raw container bytes as currently stored.
    pub async fn stored_bytes(&self) -> Result<Option<Vec<u8>>, VaultError> {
        self.store.load_raw().await
    }

    /// A second session over the same storage, as another process would see it.
    pub fn reopen(&self) -> VaultSession {
        VaultSession::new(self.store.clone(), self.session.config().clone())
    }
}
