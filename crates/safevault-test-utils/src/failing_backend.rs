// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fault-injecting persistence backend.
//!
//! `FailingBackend` stores bytes in a [`MemoryBackend`] and can be told to
//! reject reads or writes with a storage failure, so tests can observe what a
//! session does when the disk goes away mid-operation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use safevault_core::{PersistenceBackend, VaultError};
use safevault_storage::MemoryBackend;

/// A memory backend with switchable I/O failures.
#[derive(Debug, Default)]
pub struct FailingBackend {
    inner: MemoryBackend,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of writes that reached the inner store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Bytes currently stored under `key`, bypassing fault injection.
    pub async fn stored(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read_all(key).await.ok().flatten()
    }
}

#[async_trait]
impl PersistenceBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(VaultError::storage(std::io::Error::other(
                "injected read failure",
            )));
        }
        self.inner.read_all(key).await
    }

    async fn write_all_atomic(&self, key: &str, bytes: &[u8]) -> Result<(), VaultError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VaultError::storage(std::io::Error::other(
                "injected write failure",
            )));
        }
        self.inner.write_all_atomic(key, bytes).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_write_failure_leaves_previous_bytes() {
        let backend = FailingBackend::new();
        backend.write_all_atomic("vault", b"v1").await.unwrap();

        backend.fail_writes(true);
        let err = backend.write_all_atomic("vault", b"v2").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(backend.stored("vault").await, Some(b"v1".to_vec()));
        assert_eq!(backend.write_count(), 1);

        backend.fail_writes(false);
        backend.write_all_atomic("vault", b"v2").await.unwrap();
        assert_eq!(backend.write_count(), 2);
    }

    #[tokio::test]
    async fn injected_read_failure() {
        let backend = FailingBackend::new();
        backend.fail_reads(true);
        assert!(matches!(
            backend.read_all("vault").await,
            Err(VaultError::StorageFailure { .. })
        ));
    }
}
