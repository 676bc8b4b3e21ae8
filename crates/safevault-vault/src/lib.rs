// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted local vault engine for SafeVault.
//!
//! The whole record set, attachments included, is encoded by [`codec`],
//! sealed with AES-256-GCM under a key derived from the user's passphrase via
//! Argon2id ([`kdf`], [`crypto`]), and persisted as a single
//! [`container::VaultContainer`] through a [`store::VaultStore`].
//! [`session::VaultSession`] owns all decrypted state.

pub mod codec;
pub mod container;
pub mod crypto;
pub mod kdf;
pub mod prompt;
pub mod session;
pub mod store;

pub use container::VaultContainer;
pub use kdf::{KdfAlgorithm, KdfParams, VaultKey};
pub use prompt::{get_new_passphrase, get_passphrase, prompt_passphrase, PASSPHRASE_ENV_VAR};
pub use session::{
    backup_file_name, FailureReason, ImportMode, ImportOutcome, SessionConfig, SessionStatus,
    UnlockOutcome, VaultSession,
};
pub use store::VaultStore;
