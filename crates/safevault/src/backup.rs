// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `safevault export` and `safevault import` command implementation.
//!
//! Backups are the stored container bytes, still encrypted under the vault
//! passphrase. A replacing import keeps a safety copy of the current vault
//! next to the storage directory before it overwrites anything.

use std::path::{Path, PathBuf};

use chrono::Local;
use safevault_core::VaultError;
use safevault_vault::{backup_file_name, ImportMode, ImportOutcome};
use tracing::info;

use crate::context::{backup_passphrase, VaultContext};
use crate::records::write_private_new;

/// Run `safevault export`. Works without the passphrase.
pub async fn run_export(
    ctx: &VaultContext,
    path: Option<PathBuf>,
    force: bool,
) -> Result<(), VaultError> {
    let path = path.unwrap_or_else(|| PathBuf::from(backup_file_name(Local::now().date_naive())));
    let bytes = ctx.session.export_vault_blob().await?;

    if force && path.exists() {
        std::fs::remove_file(&path)?;
    }
    write_private_new(&path, &bytes)?;

    let size_kb = bytes.len() as f64 / 1024.0;
    eprintln!("Export complete: {size_kb:.1} KB written to {}", path.display());
    Ok(())
}

/// Run `safevault import`.
///
/// Without `--merge` the stored vault is replaced; with it, records from the
/// backup whose ids are not already present are added to the current vault.
pub async fn run_import(ctx: &VaultContext, path: &Path, merge: bool) -> Result<(), VaultError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        VaultError::InvalidInput(format!("cannot read backup '{}': {e}", path.display()))
    })?;

    let outcome = if merge {
        ctx.unlock().await?;
        let passphrase = backup_passphrase()?;
        ctx.session
            .import_vault_blob(&bytes, ImportMode::Merge(&passphrase))
            .await?
    } else {
        if let Some(current) = ctx.session.store().load_raw().await? {
            let safety = pre_import_path(&ctx.config.storage.path, ctx.session.store().slot());
            if safety.exists() {
                std::fs::remove_file(&safety)?;
            }
            write_private_new(&safety, &current)?;
            eprintln!("Creating safety backup: {}", safety.display());
        }
        ctx.session
            .import_vault_blob(&bytes, ImportMode::Replace)
            .await?
    };

    match outcome {
        ImportOutcome::Replaced => {
            info!(path = %path.display(), "backup restored");
            eprintln!("Import complete: vault replaced from {}", path.display());
        }
        ImportOutcome::Merged { added, skipped } => {
            eprintln!("Merge complete: {added} record(s) added, {skipped} already present");
        }
    }
    Ok(())
}

/// Where the vault is copied before a replacing import.
fn pre_import_path(storage_path: &str, slot: &str) -> PathBuf {
    Path::new(storage_path).join(format!("{slot}.pre-import.svault"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_copy_cannot_collide_with_a_slot() {
        let path = pre_import_path("/data/safevault", "vault");
        assert_eq!(path, PathBuf::from("/data/safevault/vault.pre-import.svault"));
        // Slot names cannot contain '.', so no backend slot maps to this file.
        assert_ne!(path.file_name().unwrap(), "vault.svault");
    }
}
