// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Commands that manage the vault's protection: `init`, `passwd`, and
//! `upgrade-kdf`.

use safevault_config::model::VaultConfig;
use safevault_core::VaultError;
use safevault_vault::{get_new_passphrase, KdfParams};

use crate::context::{new_passphrase, VaultContext};
use crate::UpgradeKdfArgs;

/// Run `safevault init`.
pub async fn run_init(ctx: &VaultContext) -> Result<(), VaultError> {
    let passphrase = get_new_passphrase("New vault passphrase: ")?;
    ctx.session.create_vault(&passphrase).await?;
    eprintln!(
        "Vault created in slot `{}` ({})",
        ctx.session.store().slot(),
        ctx.session.config().kdf
    );
    Ok(())
}

/// Run `safevault passwd`.
pub async fn run_passwd(ctx: &VaultContext) -> Result<(), VaultError> {
    ctx.unlock().await?;
    let replacement = new_passphrase()?;
    ctx.session.change_passphrase(&replacement).await?;
    eprintln!("Passphrase changed.");
    Ok(())
}

/// Run `safevault upgrade-kdf`.
pub async fn run_upgrade_kdf(ctx: &VaultContext, args: UpgradeKdfArgs) -> Result<(), VaultError> {
    let params = target_params(&ctx.config.vault, &args);
    let passphrase = ctx.unlock().await?;
    ctx.session.upgrade_kdf(&passphrase, params).await?;
    eprintln!("Key derivation upgraded to {params}.");
    Ok(())
}

/// Flags override the configured parameters one knob at a time.
fn target_params(config: &VaultConfig, args: &UpgradeKdfArgs) -> KdfParams {
    let base = KdfParams::from_config(config);
    KdfParams::argon2id(
        args.memory_cost.unwrap_or(base.memory_cost_kib),
        args.iterations.unwrap_or(base.iterations),
        args.parallelism.unwrap_or(base.parallelism),
    )
}
