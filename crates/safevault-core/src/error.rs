// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by every SafeVault crate.
//!
//! Messages never carry passphrases, derived keys, or decrypted field values.

use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type returned across the vault engine and its backends.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Bad caller arguments (empty title, empty passphrase, invalid KDF knobs).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Wrong passphrase or tampered data. Deliberately does not say which.
    #[error("authentication failed: wrong passphrase or tampered vault data")]
    AuthenticationFailed,

    /// Structurally invalid container or record bytes.
    #[error("corrupt vault data: {0}")]
    CorruptData(String),

    /// I/O failure in the persistence backend. Retryable by the caller.
    #[error("storage failure: {source}")]
    StorageFailure {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No vault has been initialized in this store yet.
    #[error("no vault exists yet")]
    VaultAbsent,

    /// The operation needs an unlocked session.
    #[error("vault is locked")]
    Locked,

    /// A record or attachment id did not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The caller cancelled the operation before it committed anything.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Fieldless discriminant of [`VaultError`], convenient for matching and
/// for recording why an unlock attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    AuthenticationFailed,
    CorruptData,
    StorageFailure,
    VaultAbsent,
    Locked,
    NotFound,
    Timeout,
    Cancelled,
    Internal,
}

impl VaultError {
    /// Returns the fieldless kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            Self::CorruptData(_) => ErrorKind::CorruptData,
            Self::StorageFailure { .. } => ErrorKind::StorageFailure,
            Self::VaultAbsent => ErrorKind::VaultAbsent,
            Self::Locked => ErrorKind::Locked,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Wrap any backend error as a storage failure.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::StorageFailure {
            source: source.into(),
        }
    }

    /// Whether retrying the same call may succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageFailure { .. } | Self::Timeout { .. })
    }
}

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        Self::storage(e)
    }
}
