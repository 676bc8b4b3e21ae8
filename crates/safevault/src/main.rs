// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SafeVault - an encrypted local credential vault.
//!
//! This is the binary entry point. Every command opens the configured
//! store, does its work through a `VaultSession`, and locks before exit.

mod backup;
mod context;
mod lifecycle;
mod output;
mod records;
mod status;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use safevault_core::{ErrorKind, VaultError};

use crate::context::VaultContext;

/// SafeVault - an encrypted local credential vault.
#[derive(Parser, Debug)]
#[command(name = "safevault", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new, empty vault.
    Init,
    /// Show whether a vault exists and how it is protected.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List records, newest first.
    List {
        /// Only records whose title, username, or email contain this text.
        #[arg(long, short)]
        query: Option<String>,
        /// Output as JSON (metadata only, never passwords or notes).
        #[arg(long)]
        json: bool,
    },
    /// Show one record.
    Show {
        id: String,
        /// Print the password and notes in clear text.
        #[arg(long)]
        reveal: bool,
    },
    /// Add a record.
    Add(AddArgs),
    /// Edit a record's text fields.
    Edit(EditArgs),
    /// Delete a record and its attachments.
    Rm { id: String },
    /// Attach a file to a record.
    Attach {
        record_id: String,
        file: PathBuf,
        /// Display name (defaults to the file name).
        #[arg(long)]
        name: Option<String>,
        /// MIME type (guessed from the extension by default).
        #[arg(long)]
        mime: Option<String>,
    },
    /// Remove an attachment from a record.
    Detach {
        record_id: String,
        attachment_id: String,
    },
    /// Write an attachment's content to a file.
    Extract {
        record_id: String,
        attachment_id: String,
        /// Destination (defaults to the attachment name in the current directory).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Export the encrypted vault for backup.
    Export {
        /// Destination file (defaults to safevault-backup-<date>.svault).
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Restore or merge an exported backup.
    Import {
        path: PathBuf,
        /// Add the backup's records to the current vault instead of replacing it.
        #[arg(long)]
        merge: bool,
    },
    /// Change the vault passphrase.
    Passwd,
    /// Re-seal the vault with stronger key derivation parameters.
    UpgradeKdf(UpgradeKdfArgs),
}

#[derive(Args, Debug)]
struct AddArgs {
    title: String,
    #[arg(long, short)]
    username: Option<String>,
    #[arg(long, short)]
    email: Option<String>,
    #[arg(long, short)]
    notes: Option<String>,
    /// Prompt for a password to store with the record.
    #[arg(long, short)]
    password: bool,
}

#[derive(Args, Debug)]
struct EditArgs {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long, conflicts_with = "clear_username")]
    username: Option<String>,
    #[arg(long, conflicts_with = "clear_email")]
    email: Option<String>,
    #[arg(long, conflicts_with = "clear_notes")]
    notes: Option<String>,
    /// Prompt for a new password.
    #[arg(long, conflicts_with = "clear_password")]
    password: bool,
    #[arg(long)]
    clear_username: bool,
    #[arg(long)]
    clear_email: bool,
    #[arg(long)]
    clear_notes: bool,
    #[arg(long)]
    clear_password: bool,
}

#[derive(Args, Debug)]
struct UpgradeKdfArgs {
    /// Argon2id memory cost in KiB (defaults to `vault.kdf_memory_cost`).
    #[arg(long)]
    memory_cost: Option<u32>,
    /// Argon2id iterations (defaults to `vault.kdf_iterations`).
    #[arg(long)]
    iterations: Option<u32>,
    /// Argon2id lanes (defaults to `vault.kdf_parallelism`).
    #[arg(long)]
    parallelism: Option<u32>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => safevault_config::load_and_validate_path(path),
        None => safevault_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            safevault_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log.level);

    let use_color = output::use_color(cli.plain);
    let ctx = match VaultContext::open(config).await {
        Ok(ctx) => ctx,
        Err(e) => exit_with(&e, use_color),
    };

    let result = run(&ctx, cli.command, use_color).await;
    ctx.session.lock();
    if let Err(e) = result {
        exit_with(&e, use_color);
    }
}

async fn run(ctx: &VaultContext, command: Commands, use_color: bool) -> Result<(), VaultError> {
    match command {
        Commands::Init => lifecycle::run_init(ctx).await,
        Commands::Status { json } => status::run_status(ctx, json, use_color).await,
        Commands::List { query, json } => {
            records::run_list(ctx, query.as_deref(), json, use_color).await
        }
        Commands::Show { id, reveal } => records::run_show(ctx, &id, reveal, use_color).await,
        Commands::Add(args) => records::run_add(ctx, args).await,
        Commands::Edit(args) => records::run_edit(ctx, args).await,
        Commands::Rm { id } => records::run_remove(ctx, &id).await,
        Commands::Attach {
            record_id,
            file,
            name,
            mime,
        } => records::run_attach(ctx, &record_id, &file, name, mime).await,
        Commands::Detach {
            record_id,
            attachment_id,
        } => records::run_detach(ctx, &record_id, &attachment_id).await,
        Commands::Extract {
            record_id,
            attachment_id,
            output,
        } => records::run_extract(ctx, &record_id, &attachment_id, output, use_color).await,
        Commands::Export { path, force } => backup::run_export(ctx, path, force).await,
        Commands::Import { path, merge } => backup::run_import(ctx, &path, merge).await,
        Commands::Passwd => lifecycle::run_passwd(ctx).await,
        Commands::UpgradeKdf(args) => lifecycle::run_upgrade_kdf(ctx, args).await,
    }
}

/// Print the error and exit with a code scripts can branch on.
fn exit_with(err: &VaultError, use_color: bool) -> ! {
    output::print_error(err, use_color);
    let code = match err.kind() {
        ErrorKind::AuthenticationFailed => 2,
        ErrorKind::VaultAbsent => 3,
        ErrorKind::NotFound => 4,
        _ => 1,
    };
    std::process::exit(code);
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("safevault={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
