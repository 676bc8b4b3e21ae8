// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal formatting helpers.

use std::io::IsTerminal;

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use safevault_core::VaultError;

/// Colors only when asked for and stdout is a terminal.
pub fn use_color(plain: bool) -> bool {
    !plain && std::io::stdout().is_terminal()
}

/// Mask a secret for display, showing only the first and last four characters.
///
/// Values shorter than ten characters are fully masked.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}...{suffix}")
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Print a section heading in the style used by every command.
pub fn heading(title: &str) {
    println!();
    println!("  {title}");
    println!("  {}", "-".repeat(50));
}

pub fn print_success(message: &str, use_color: bool) {
    if use_color {
        eprintln!("{} {message}", "✓".green());
    } else {
        eprintln!("[OK] {message}");
    }
}

pub fn print_error(err: &VaultError, use_color: bool) {
    if use_color {
        eprintln!("{} {err}", "error:".red().bold());
    } else {
        eprintln!("error: {err}");
    }
    if let Some(hint) = hint_for(err) {
        eprintln!("  {hint}");
    }
}

fn hint_for(err: &VaultError) -> Option<&'static str> {
    match err {
        VaultError::VaultAbsent => Some("create one with: safevault init"),
        VaultError::StorageFailure { .. } => {
            Some("the previous vault contents are unchanged; check disk space and permissions")
        }
        VaultError::Timeout { .. } => {
            Some("raise or unset vault.unlock_timeout_secs if the machine is slow")
        }
        _ => None,
    }
}
