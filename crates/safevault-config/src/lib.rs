// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for SafeVault: the `[vault]` key-derivation and session
//! settings, the `[storage]` backend location, and `[log]`.
//!
//! Files are layered `/etc` < user config dir < `./safevault.toml`, then
//! `SAFEVAULT_*` environment variables. Unknown keys are rejected and
//! reported as miette diagnostics.
//!
//! ```no_run
//! let config = safevault_config::load_and_validate().expect("config errors");
//! println!("vault slot: {}", config.storage.slot);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{render_errors, ConfigError, ConfigSource};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{SafevaultConfig, StorageBackendKind};

/// Load from the standard file hierarchy plus environment, then validate.
pub fn load_and_validate() -> Result<SafevaultConfig, Vec<ConfigError>> {
    finish(loader::load_config(), || {
        loader::config_files()
            .iter()
            .filter_map(|path| ConfigSource::read(path))
            .collect()
    })
}

/// Load from an explicit file plus environment, then validate.
pub fn load_and_validate_path(path: &Path) -> Result<SafevaultConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        ConfigSource::read(path).into_iter().collect()
    })
}

/// Load from a TOML string alone, then validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<SafevaultConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![ConfigSource::inline(toml_content)]
    })
}

/// Sources are only read back when there is an error to point into.
fn finish(
    loaded: Result<SafevaultConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<ConfigSource>,
) -> Result<SafevaultConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}
