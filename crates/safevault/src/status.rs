// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `safevault status` command implementation.
//!
//! Reads only the unencrypted container header, so it never needs the
//! passphrase. A corrupt container is reported, not treated as an error.

use serde::Serialize;

use safevault_core::VaultError;
use safevault_vault::{KdfParams, VaultContainer};

use crate::context::VaultContext;
use crate::output::heading;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// `absent`, `present`, or `corrupt`.
    pub vault: &'static str,
    pub backend: String,
    pub slot: String,
    pub path: String,
    pub size_bytes: Option<usize>,
    pub format_version: Option<u16>,
    pub kdf: Option<String>,
    /// Whether the stored KDF parameters are weaker than the configured ones.
    pub kdf_upgrade_available: bool,
    pub detail: Option<String>,
}

/// Run the `safevault status` command.
pub async fn run_status(ctx: &VaultContext, json: bool, use_color: bool) -> Result<(), VaultError> {
    let store = ctx.session.store();
    let raw = store.load_raw().await?;
    let configured = ctx.session.config().kdf;
    let status = describe(
        raw.as_deref(),
        configured,
        store.backend_name(),
        store.slot(),
        &ctx.config.storage.path,
    );

    if json {
        let rendered = serde_json::to_string_pretty(&status)
            .map_err(|e| VaultError::Internal(format!("failed to render JSON: {e}")))?;
        println!("{rendered}");
    } else {
        print_status(&status, use_color);
    }
    Ok(())
}

fn describe(
    raw: Option<&[u8]>,
    configured: KdfParams,
    backend: &str,
    slot: &str,
    path: &str,
) -> StatusResponse {
    let mut status = StatusResponse {
        vault: "absent",
        backend: backend.to_string(),
        slot: slot.to_string(),
        path: path.to_string(),
        size_bytes: None,
        format_version: None,
        kdf: None,
        kdf_upgrade_available: false,
        detail: None,
    };
    let Some(bytes) = raw else {
        return status;
    };
    status.size_bytes = Some(bytes.len());
    match VaultContainer::from_bytes(bytes) {
        Ok(container) => {
            status.vault = "present";
            status.format_version = Some(container.format_version);
            status.kdf = Some(container.kdf.to_string());
            status.kdf_upgrade_available =
                configured != container.kdf && configured.is_at_least(&container.kdf);
        }
        Err(e) => {
            status.vault = "corrupt";
            status.detail = Some(e.to_string());
        }
    }
    status
}

fn print_status(status: &StatusResponse, use_color: bool) {
    heading("safevault status");

    let state = match (status.vault, use_color) {
        ("present", true) => {
            use colored::Colorize;
            format!("{} present", "✓".green())
        }
        ("corrupt", true) => {
            use colored::Colorize;
            format!("{} {}", "✗".red(), "corrupt".red())
        }
        ("present", false) => "[OK] present".to_string(),
        ("corrupt", false) => "[FAIL] corrupt".to_string(),
        (other, _) => other.to_string(),
    };
    println!("    Vault:    {state}");
    println!("    Storage:  {} ({})", status.backend, status.path);
    println!("    Slot:     {}", status.slot);
    if let Some(size) = status.size_bytes {
        println!("    Size:     {size} bytes");
    }
    if let Some(kdf) = &status.kdf {
        println!("    KDF:      {kdf}");
    }
    if let Some(detail) = &status.detail {
        println!("    Detail:   {detail}");
    }
    println!();
    if status.vault == "absent" {
        println!("  Create one with: safevault init");
        println!();
    } else if status.kdf_upgrade_available {
        println!("  Stronger KDF settings are configured; apply with: safevault upgrade-kdf");
        println!();
    }
}
