// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./safevault.toml` > `~/.config/safevault/safevault.toml` > `/etc/safevault/safevault.toml`
//! with environment variable overrides via `SAFEVAULT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::SafevaultConfig;

/// Environment variables under the `SAFEVAULT_` prefix that are not config keys.
const NON_CONFIG_ENV_KEYS: &[&str] = &["passphrase"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/safevault/safevault.toml` (system-wide)
/// 3. `~/.config/safevault/safevault.toml` (user XDG config)
/// 4. `./safevault.toml` (local directory)
/// 5. `SAFEVAULT_*` environment variables
pub fn load_config() -> Result<SafevaultConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<SafevaultConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SafevaultConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SafevaultConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SafevaultConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    config_files()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(SafevaultConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Candidate config files, lowest precedence first.
pub fn config_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc/safevault/safevault.toml")];
    if let Some(dir) = dirs::config_dir() {
        files.push(dir.join("safevault/safevault.toml"));
    }
    files.push(PathBuf::from("safevault.toml"));
    files
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `SAFEVAULT_VAULT_KDF_MEMORY_COST` must map to
/// `vault.kdf_memory_cost`, not `vault.kdf.memory.cost`.
fn env_provider() -> Env {
    Env::prefixed("SAFEVAULT_")
        .ignore(NON_CONFIG_ENV_KEYS)
        .map(|key| {
            // Example: SAFEVAULT_STORAGE_BACKEND -> "storage_backend" -> "storage.backend"
            let mapped = key
                .as_str()
                .replacen("vault_", "vault.", 1)
                .replacen("storage_", "storage.", 1)
                .replacen("log_", "log.", 1);
            mapped.into()
        })
}
