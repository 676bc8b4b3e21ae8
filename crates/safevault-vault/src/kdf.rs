// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argon2id key derivation from a passphrase.
//!
//! Derives a 32-byte vault key using Argon2id (Algorithm::Argon2id, Version::V0x13).
//! The cost knobs travel with the container in [`KdfParams`] so a vault created
//! under weaker parameters stays readable after the defaults are raised.

use std::fmt;

use ring::rand::{SecureRandom, SystemRandom};
use safevault_config::model::VaultConfig;
use safevault_core::VaultError;
use zeroize::Zeroizing;

/// Length of the per-vault Argon2id salt in bytes.
pub const SALT_LEN: usize = 16;

/// Length of the derived AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Upper bound on the memory cost accepted from a container header (4 GiB).
///
/// A tampered header cannot make unlock allocate more than this.
pub const MAX_MEMORY_COST_KIB: u32 = 4 * 1024 * 1024;

/// Key derivation algorithm recorded in the container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfAlgorithm {
    /// Argon2id, version 0x13.
    Argon2id,
}

impl KdfAlgorithm {
    /// On-disk identifier.
    pub fn id(self) -> u8 {
        match self {
            Self::Argon2id => 1,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Argon2id),
            _ => None,
        }
    }
}

/// Explicit cost parameters for a key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    /// Memory cost in KiB.
    pub memory_cost_kib: u32,
    pub iterations: u32,
    /// Number of lanes.
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// OWASP-recommended Argon2id settings: 64 MiB, 3 passes, 4 lanes.
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            memory_cost_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    pub fn argon2id(memory_cost_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            memory_cost_kib,
            iterations,
            parallelism,
        }
    }

    /// Parameters for newly created vaults, taken from the `[vault]` config section.
    pub fn from_config(config: &VaultConfig) -> Self {
        Self::argon2id(
            config.kdf_memory_cost,
            config.kdf_iterations,
            config.kdf_parallelism,
        )
    }

    /// Check the knobs against what Argon2id accepts.
    pub fn validate(&self) -> Result<(), VaultError> {
        self.argon2_params().map(|_| ())
    }

    /// True when every knob of `self` is at least as costly as in `other`.
    pub fn is_at_least(&self, other: &KdfParams) -> bool {
        self.memory_cost_kib >= other.memory_cost_kib
            && self.iterations >= other.iterations
            && self.parallelism >= other.parallelism
    }

    fn argon2_params(&self) -> Result<argon2::Params, VaultError> {
        if self.memory_cost_kib > MAX_MEMORY_COST_KIB {
            return Err(VaultError::InvalidInput(format!(
                "Argon2id memory cost {} KiB exceeds the {MAX_MEMORY_COST_KIB} KiB limit",
                self.memory_cost_kib
            )));
        }
        argon2::Params::new(
            self.memory_cost_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| VaultError::InvalidInput(format!("invalid Argon2id parameters: {e}")))
    }
}

impl fmt::Display for KdfParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "argon2id m={}KiB t={} p={}",
            self.memory_cost_kib, self.iterations, self.parallelism
        )
    }
}

/// A derived 256-bit vault key. Zeroed on drop, never printed.
pub struct VaultKey(Zeroizing<[u8; KEY_LEN]>);

impl VaultKey {
    /// Generate a random key. Used where no passphrase is involved.
    pub fn generate() -> Result<Self, VaultError> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        SystemRandom::new()
            .fill(key.as_mut())
            .map_err(|_| VaultError::Internal("failed to generate random key".to_string()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Derive the vault key from a passphrase.
///
/// Deterministic for identical inputs. Fails with `InvalidInput` on an empty
/// passphrase or out-of-range parameters. This is CPU and memory heavy; async
/// callers should run it on a blocking thread.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
) -> Result<VaultKey, VaultError> {
    if passphrase.is_empty() {
        return Err(VaultError::InvalidInput(
            "passphrase must not be empty".to_string(),
        ));
    }

    let argon2 = match params.algorithm {
        KdfAlgorithm::Argon2id => argon2::Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params.argon2_params()?,
        ),
    };

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase, salt, output.as_mut())
        .map_err(|e| VaultError::Internal(format!("Argon2id key derivation failed: {e}")))?;

    Ok(VaultKey(output))
}

/// Generate a random salt. Called exactly once per vault, at creation.
pub fn generate_salt() -> Result<[u8; SALT_LEN], VaultError> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| VaultError::Internal("failed to generate random salt".to_string()))?;
    Ok(salt)
}
