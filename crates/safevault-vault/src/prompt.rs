// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Passphrase acquisition via TTY prompt or SAFEVAULT_PASSPHRASE environment variable.

use safevault_core::VaultError;
use secrecy::SecretString;
use zeroize::Zeroizing;

/// The environment variable name for providing the vault passphrase.
pub const PASSPHRASE_ENV_VAR: &str = "SAFEVAULT_PASSPHRASE";

/// Get the vault passphrase from the environment or an interactive TTY prompt.
///
/// Priority:
/// 1. `SAFEVAULT_PASSPHRASE` environment variable (scripts, CI)
/// 2. Interactive TTY prompt via `rpassword`
///
/// Returns an error if neither source is available.
pub fn get_passphrase(prompt: &str) -> Result<SecretString, VaultError> {
    if let Some(passphrase) = from_env() {
        return Ok(passphrase);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let passphrase = read(prompt)?;
        return non_empty(passphrase);
    }

    Err(no_source())
}

/// Get a new passphrase, asking twice on a TTY (vault creation, passphrase change).
///
/// The environment variable does not need confirmation.
pub fn get_new_passphrase(prompt: &str) -> Result<SecretString, VaultError> {
    if let Some(passphrase) = from_env() {
        return Ok(passphrase);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let first = read(prompt)?;
        let second = read("Confirm passphrase: ")?;
        if *first != *second {
            return Err(VaultError::InvalidInput(
                "passphrases do not match".to_string(),
            ));
        }
        return non_empty(first);
    }

    Err(no_source())
}

/// Prompt on the TTY only. Used for a second, different passphrase such as
/// the one protecting a backup being merged.
pub fn prompt_passphrase(prompt: &str) -> Result<SecretString, VaultError> {
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(VaultError::InvalidInput(format!(
            "`{}` needs an interactive terminal",
            prompt.trim_end_matches([':', ' '])
        )));
    }
    non_empty(read(prompt)?)
}

fn from_env() -> Option<SecretString> {
    std::env::var(PASSPHRASE_ENV_VAR)
        .ok()
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
}

fn read(prompt: &str) -> Result<Zeroizing<String>, VaultError> {
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .map_err(|e| VaultError::Internal(format!("failed to read passphrase: {e}")))
}

fn non_empty(passphrase: Zeroizing<String>) -> Result<SecretString, VaultError> {
    if passphrase.is_empty() {
        return Err(VaultError::InvalidInput(
            "empty passphrase not allowed".to_string(),
        ));
    }
    Ok(SecretString::from(passphrase.as_str().to_owned()))
}

fn no_source() -> VaultError {
    VaultError::InvalidInput(format!(
        "no passphrase provided; set {PASSPHRASE_ENV_VAR} or run interactively"
    ))
}
