// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for SafeVault.
//!
//! This crate provides the error taxonomy, the credential data model, and the
//! persistence trait used throughout the SafeVault workspace. Backends
//! implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorKind, VaultError};
pub use traits::PersistenceBackend;
pub use types::{
    Attachment, AttachmentId, CredentialRecord, CredentialUpdate, NewAttachment, NewCredential,
    RecordId, RecordSummary, DEFAULT_MIME_TYPE,
};
