// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as Argon2id cost floors, non-empty paths, and slot names usable as file names.

use crate::diagnostic::ConfigError;
use crate::model::SafevaultConfig;

/// Smallest Argon2id memory cost accepted from configuration, in KiB.
pub const MIN_KDF_MEMORY_COST: u32 = 8192;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &SafevaultConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate vault KDF parameters
    if config.vault.kdf_memory_cost < MIN_KDF_MEMORY_COST {
        errors.push(ConfigError::Validation {
            message: format!(
                "vault.kdf_memory_cost must be at least {MIN_KDF_MEMORY_COST} (8 MiB), got {}",
                config.vault.kdf_memory_cost
            ),
        });
    }

    if config.vault.kdf_iterations < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "vault.kdf_iterations must be at least 1, got {}",
                config.vault.kdf_iterations
            ),
        });
    }

    if config.vault.kdf_parallelism < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "vault.kdf_parallelism must be at least 1, got {}",
                config.vault.kdf_parallelism
            ),
        });
    } else if u64::from(config.vault.kdf_memory_cost) < 8 * u64::from(config.vault.kdf_parallelism) {
        errors.push(ConfigError::Validation {
            message: format!(
                "vault.kdf_memory_cost must be at least 8 KiB per lane ({} lanes), got {}",
                config.vault.kdf_parallelism, config.vault.kdf_memory_cost
            ),
        });
    }

    if config.vault.idle_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "vault.idle_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.vault.unlock_timeout_secs == Some(0) {
        errors.push(ConfigError::Validation {
            message: "vault.unlock_timeout_secs must be at least 1 when set".to_string(),
        });
    }

    // Validate storage location
    if config.storage.path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.path must not be empty".to_string(),
        });
    }

    let slot = config.storage.slot.as_str();
    if slot.is_empty()
        || !slot
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "storage.slot `{slot}` must be non-empty and contain only ASCII letters, digits, `-` or `_`"
            ),
        });
    }

    if !LOG_LEVELS.contains(&config.log.level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level `{}` is not one of {}",
                config.log.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
