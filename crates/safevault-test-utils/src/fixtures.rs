// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures.

use std::time::Duration;

use safevault_core::{NewAttachment, NewCredential};
use safevault_vault::{KdfParams, SessionConfig};
use secrecy::SecretString;

/// The cheapest Argon2id parameters the KDF accepts. Never use outside tests.
pub fn fast_kdf() -> KdfParams {
    KdfParams::argon2id(8, 1, 1)
}

/// Session config with [`fast_kdf`] and a generous unlock bound.
pub fn fast_session_config() -> SessionConfig {
    SessionConfig {
        kdf: fast_kdf(),
        idle_timeout: Duration::from_secs(300),
        unlock_timeout: Some(Duration::from_secs(30)),
    }
}

pub fn passphrase(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

/// A fully populated record with one attachment.
pub fn bank_credential() -> NewCredential {
    NewCredential::new("Bank")
        .username("alice")
        .email("alice@example.com")
        .password("p@ss")
        .notes("security questions: none")
        .attachment(NewAttachment::new(
            "recovery-codes.txt",
            "text/plain",
            b"1111-2222\n3333-4444\n".to_vec(),
        ))
}
