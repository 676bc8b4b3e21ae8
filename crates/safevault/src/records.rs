// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record and attachment commands: `list`, `show`, `add`, `edit`, `rm`,
//! `attach`, `detach`, `extract`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;
use safevault_core::{
    AttachmentId, CredentialRecord, CredentialUpdate, NewAttachment, NewCredential, RecordId,
    RecordSummary, VaultError, DEFAULT_MIME_TYPE,
};
use safevault_vault::prompt_passphrase;
use secrecy::ExposeSecret;

use crate::context::VaultContext;
use crate::output::{self, format_timestamp, heading, mask_secret};
use crate::{AddArgs, EditArgs};

/// Run `safevault list`.
pub async fn run_list(
    ctx: &VaultContext,
    query: Option<&str>,
    json: bool,
    use_color: bool,
) -> Result<(), VaultError> {
    ctx.unlock().await?;
    let records = match query {
        Some(q) => ctx.session.search(q)?,
        None => ctx.session.list_records()?,
    };
    let summaries: Vec<RecordSummary> = records.iter().map(CredentialRecord::summary).collect();

    if json {
        let rendered = serde_json::to_string_pretty(&summaries)
            .map_err(|e| VaultError::Internal(format!("failed to render JSON: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No records.");
        return Ok(());
    }
    for summary in &summaries {
        print_summary(summary, use_color);
    }
    println!();
    println!("  {} record(s)", summaries.len());
    Ok(())
}

fn print_summary(summary: &RecordSummary, use_color: bool) {
    let login = summary
        .username
        .as_deref()
        .or(summary.email.as_deref())
        .unwrap_or("-");
    let clip = if summary.attachment_count > 0 {
        format!(" [{} file(s)]", summary.attachment_count)
    } else {
        String::new()
    };
    if use_color {
        println!(
            "  {}  {}  {}{}",
            summary.id.to_string().dimmed(),
            summary.title.bold(),
            login,
            clip.cyan()
        );
    } else {
        println!("  {}  {}  {}{}", summary.id, summary.title, login, clip);
    }
}

/// Run `safevault show`.
pub async fn run_show(
    ctx: &VaultContext,
    id: &str,
    reveal: bool,
    use_color: bool,
) -> Result<(), VaultError> {
    let id: RecordId = id.parse()?;
    ctx.unlock().await?;
    let record = ctx.session.get_record(id)?;

    heading(&record.title);
    println!("    Id:        {}", record.id);
    println!("    Username:  {}", record.username.as_deref().unwrap_or("-"));
    println!("    Email:     {}", record.email.as_deref().unwrap_or("-"));
    let password = match (&record.password, reveal) {
        (None, _) => "-".to_string(),
        (Some(p), true) => p.clone(),
        (Some(p), false) => mask_secret(p),
    };
    println!("    Password:  {password}");
    match (&record.notes, reveal) {
        (None, _) => println!("    Notes:     -"),
        (Some(notes), true) => println!("    Notes:     {notes}"),
        (Some(_), false) => println!("    Notes:     (hidden, use --reveal)"),
    }
    println!("    Created:   {}", format_timestamp(&record.created_at));
    println!("    Updated:   {}", format_timestamp(&record.updated_at));

    if !record.attachments.is_empty() {
        println!();
        println!("    Attachments:");
        for attachment in &record.attachments {
            let id = if use_color {
                attachment.id.to_string().dimmed().to_string()
            } else {
                attachment.id.to_string()
            };
            println!(
                "      {id}  {}  {}  {}",
                attachment.name,
                attachment.mime_type,
                attachment.display_size()
            );
        }
    }
    println!();
    Ok(())
}

/// Run `safevault add`. Prints the new record id on stdout.
pub async fn run_add(ctx: &VaultContext, args: AddArgs) -> Result<(), VaultError> {
    let mut input = NewCredential::new(args.title);
    if let Some(username) = args.username {
        input = input.username(username);
    }
    if let Some(email) = args.email {
        input = input.email(email);
    }
    if let Some(notes) = args.notes {
        input = input.notes(notes);
    }
    ctx.unlock().await?;
    if args.password {
        let password = prompt_passphrase("Record password: ")?;
        input = input.password(password.expose_secret());
    }

    let id = ctx.session.add_record(input).await?;
    println!("{id}");
    Ok(())
}

/// Run `safevault edit`.
pub async fn run_edit(ctx: &VaultContext, args: EditArgs) -> Result<(), VaultError> {
    let id: RecordId = args.id.parse()?;
    let mut update = CredentialUpdate::default();
    if let Some(title) = args.title {
        update = update.title(title);
    }
    update = match (args.username, args.clear_username) {
        (Some(v), _) => update.username(v),
        (None, true) => update.clear_username(),
        (None, false) => update,
    };
    update = match (args.email, args.clear_email) {
        (Some(v), _) => update.email(v),
        (None, true) => update.clear_email(),
        (None, false) => update,
    };
    update = match (args.notes, args.clear_notes) {
        (Some(v), _) => update.notes(v),
        (None, true) => update.clear_notes(),
        (None, false) => update,
    };
    if args.clear_password {
        update = update.clear_password();
    }

    ctx.unlock().await?;
    if args.password {
        let password = prompt_passphrase("New record password: ")?;
        update = update.password(password.expose_secret());
    }
    if update.is_empty() {
        return Err(VaultError::InvalidInput(
            "nothing to change; pass at least one field flag".to_string(),
        ));
    }
    ctx.session.update_record(id, update).await
}

/// Run `safevault rm`.
pub async fn run_remove(ctx: &VaultContext, id: &str) -> Result<(), VaultError> {
    let id: RecordId = id.parse()?;
    ctx.unlock().await?;
    ctx.session.delete_record(id).await
}

/// Run `safevault attach`. Prints the new attachment id on stdout.
pub async fn run_attach(
    ctx: &VaultContext,
    record_id: &str,
    file: &Path,
    name: Option<String>,
    mime: Option<String>,
) -> Result<(), VaultError> {
    let record_id: RecordId = record_id.parse()?;
    let content = tokio::fs::read(file).await.map_err(|e| {
        VaultError::InvalidInput(format!("cannot read '{}': {e}", file.display()))
    })?;
    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                VaultError::InvalidInput(format!("'{}' has no file name", file.display()))
            })?,
    };
    let mime = mime.unwrap_or_else(|| guess_mime_type(file).to_string());

    ctx.unlock().await?;
    let id = ctx
        .session
        .add_attachment(record_id, NewAttachment::new(name, mime, content))
        .await?;
    println!("{id}");
    Ok(())
}

/// Run `safevault detach`.
pub async fn run_detach(
    ctx: &VaultContext,
    record_id: &str,
    attachment_id: &str,
) -> Result<(), VaultError> {
    let record_id: RecordId = record_id.parse()?;
    let attachment_id: AttachmentId = attachment_id.parse()?;
    ctx.unlock().await?;
    ctx.session.remove_attachment(record_id, attachment_id).await
}

/// Run `safevault extract`. Refuses to overwrite an existing file.
pub async fn run_extract(
    ctx: &VaultContext,
    record_id: &str,
    attachment_id: &str,
    output: Option<PathBuf>,
    use_color: bool,
) -> Result<(), VaultError> {
    let record_id: RecordId = record_id.parse()?;
    let attachment_id: AttachmentId = attachment_id.parse()?;
    ctx.unlock().await?;
    let attachment = ctx.session.get_attachment(record_id, attachment_id)?;

    let path = match output {
        Some(path) => path,
        None => PathBuf::from(safe_file_name(&attachment.name)),
    };
    write_private_new(&path, &attachment.content)?;
    output::print_success(
        &format!("{} written to {}", attachment.display_size(), path.display()),
        use_color,
    );
    Ok(())
}

/// Create `path` with owner-only permissions, failing if it already exists.
pub fn write_private_new(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            VaultError::InvalidInput(format!("'{}' already exists", path.display()))
        } else {
            VaultError::storage(format!("failed to create '{}': {e}", path.display()))
        }
    })?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

/// Reduce an attachment display name to a bare file name in the current directory.
fn safe_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." {
        "attachment.bin".to_string()
    } else {
        base
    }
}

fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => DEFAULT_MIME_TYPE,
    }
}
