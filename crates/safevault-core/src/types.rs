// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential data model: records, attachments, and the inputs used to
//! create and edit them.
//!
//! Every type that can hold decrypted vault content zeroizes itself on drop,
//! and its `Debug` output redacts secret fields.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::VaultError;

/// MIME type recorded when the caller does not supply one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Unique identifier of a credential record within a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

/// Identifier of an attachment, unique within its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachmentId(pub Uuid);

macro_rules! uuid_id {
    ($ty:ident, $label:literal) => {
        impl $ty {
            /// Generate a fresh random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl FromStr for $ty {
            type Err = VaultError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| VaultError::InvalidInput(format!("`{s}` is not a valid {}", $label)))
            }
        }
    };
}

uuid_id!(RecordId, "record id");
uuid_id!(AttachmentId, "attachment id");

/// A stored credential: login details, free-text notes, and file attachments.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CredentialRecord {
    #[zeroize(skip)]
    pub id: RecordId,
    pub title: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub notes: Option<String>,
    pub attachments: Vec<Attachment>,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("notes", &self.notes.as_ref().map(|_| "[REDACTED]"))
            .field("attachments", &self.attachments)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

impl CredentialRecord {
    /// Case-insensitive substring match over title, username, and email.
    ///
    /// An empty (or all-whitespace) query matches every record.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hit = |field: Option<&str>| field.is_some_and(|v| v.to_lowercase().contains(&needle));
        hit(Some(self.title.as_str())) || hit(self.username.as_deref()) || hit(self.email.as_deref())
    }

    pub fn attachment(&self, id: AttachmentId) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.id == id)
    }

    /// Append an attachment, generating an id unique within this record.
    pub fn push_attachment(
        &mut self,
        mut input: NewAttachment,
        now: DateTime<Utc>,
    ) -> Result<AttachmentId, VaultError> {
        input.validate()?;
        let mut id = AttachmentId::new_random();
        while self.attachment(id).is_some() {
            id = AttachmentId::new_random();
        }
        let mime_type = std::mem::take(&mut input.mime_type);
        self.attachments.push(Attachment {
            id,
            name: std::mem::take(&mut input.name).trim().to_string(),
            mime_type: if mime_type.trim().is_empty() {
                DEFAULT_MIME_TYPE.to_string()
            } else {
                mime_type.trim().to_string()
            },
            content: std::mem::take(&mut input.content),
        });
        self.updated_at = now;
        Ok(id)
    }

    /// Remove an attachment by id.
    pub fn remove_attachment(
        &mut self,
        id: AttachmentId,
        now: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        let index = self
            .attachments
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| VaultError::NotFound(format!("attachment {id} in record {}", self.id)))?;
        // Dropping the removed attachment wipes its content.
        self.attachments.remove(index);
        self.updated_at = now;
        Ok(())
    }

    /// Non-secret metadata for listings.
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id,
            title: self.title.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            has_password: self.password.as_deref().is_some_and(|p| !p.is_empty()),
            attachment_count: self.attachments.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A binary file attached to a credential record.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Attachment {
    #[zeroize(skip)]
    pub id: AttachmentId,
    /// Display name, not a filesystem path.
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("id", &self.id)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes())
            .finish_non_exhaustive()
    }
}

impl Attachment {
    /// Content length in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }

    /// Human-readable size, e.g. `"12.3 KB"`.
    pub fn display_size(&self) -> String {
        format!("{:.1} KB", self.content.len() as f64 / 1024.0)
    }
}

/// Listing metadata for a record. Carries no password, notes, or attachment content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub id: RecordId,
    pub title: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub has_password: bool,
    pub attachment_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An attachment to be added to a record.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct NewAttachment {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl NewAttachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content,
        }
    }

    fn validate(&self) -> Result<(), VaultError> {
        if self.name.trim().is_empty() {
            return Err(VaultError::InvalidInput(
                "attachment name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Input for creating a credential record. The session assigns `id`,
/// `created_at`, and attachment ids.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct NewCredential {
    pub title: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub notes: Option<String>,
    pub attachments: Vec<NewAttachment>,
}

impl NewCredential {
    pub fn new(title: impl Into<String>) -> Self {
        let mut credential = Self::default();
        credential.title = title.into();
        credential
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn attachment(mut self, attachment: NewAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Validate and turn this input into a record with the given id and timestamp.
    pub fn into_record(
        mut self,
        id: RecordId,
        now: DateTime<Utc>,
    ) -> Result<CredentialRecord, VaultError> {
        validate_title(&self.title)?;
        let mut record = CredentialRecord {
            id,
            title: std::mem::take(&mut self.title).trim().to_string(),
            username: self.username.take(),
            email: self.email.take(),
            password: self.password.take(),
            notes: self.notes.take(),
            attachments: Vec::with_capacity(self.attachments.len()),
            created_at: now,
            updated_at: now,
        };
        for attachment in std::mem::take(&mut self.attachments) {
            record.push_attachment(attachment, now)?;
        }
        Ok(record)
    }
}

/// A partial edit of a record's text fields.
///
/// For optional fields, `None` leaves the field unchanged, `Some(None)`
/// clears it, and `Some(Some(v))` sets it.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct CredentialUpdate {
    pub title: Option<String>,
    pub username: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub password: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

impl CredentialUpdate {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(Some(username.into()));
        self
    }

    pub fn clear_username(mut self) -> Self {
        self.username = Some(None);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(Some(email.into()));
        self
    }

    pub fn clear_email(mut self) -> Self {
        self.email = Some(None);
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Some(password.into()));
        self
    }

    pub fn clear_password(mut self) -> Self {
        self.password = Some(None);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(Some(notes.into()));
        self
    }

    pub fn clear_notes(mut self) -> Self {
        self.notes = Some(None);
        self
    }

    /// True when applying this update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.username.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.notes.is_none()
    }

    /// Apply the edit to `record`. Validates before touching anything, so a
    /// rejected update leaves the record unchanged.
    pub fn apply_to(
        &mut self,
        record: &mut CredentialRecord,
        now: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(title) = self.title.take() {
            let title = Zeroizing::new(title);
            replace_wiped(&mut record.title, title.trim().to_string());
        }
        if let Some(username) = self.username.take() {
            replace_wiped(&mut record.username, username);
        }
        if let Some(email) = self.email.take() {
            replace_wiped(&mut record.email, email);
        }
        if let Some(password) = self.password.take() {
            replace_wiped(&mut record.password, password);
        }
        if let Some(notes) = self.notes.take() {
            replace_wiped(&mut record.notes, notes);
        }
        record.updated_at = now;
        Ok(())
    }
}

/// Overwrite `slot`, wiping the value it held first.
fn replace_wiped<T: Zeroize>(slot: &mut T, value: T) {
    slot.zeroize();
    *slot = value;
}

fn validate_title(title: &str) -> Result<(), VaultError> {
    if title.trim().is_empty() {
        return Err(VaultError::InvalidInput(
            "title must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(now: DateTime<Utc>) -> CredentialRecord {
        NewCredential::new("Bank")
            .username("alice")
            .email("alice@example.com")
            .password("p@ss")
            .notes("recovery: 1234")
            .into_record(RecordId::new_random(), now)
            .unwrap()
    }

    #[test]
    fn into_record_trims_title_and_sets_timestamps() {
        let now = Utc::now();
        let record = NewCredential::new("  Netflix ")
            .into_record(RecordId::new_random(), now)
            .unwrap();
        assert_eq!(record.title, "Netflix");
        assert_eq!(record.created_at, now);
        assert_eq!(record.updated_at, now);
        assert!(record.attachments.is_empty());
    }

    #[test]
    fn blank_title_is_invalid_input() {
        let err = NewCredential::new("   ")
            .into_record(RecordId::new_random(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let record = sample(Utc::now());
        let debug = format!("{record:?}");
        assert!(!debug.contains("p@ss"));
        assert!(!debug.contains("recovery"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn matches_is_case_insensitive_over_identity_fields() {
        let record = sample(Utc::now());
        assert!(record.matches("BANK"));
        assert!(record.matches("Ali"));
        assert!(record.matches("example.com"));
        assert!(record.matches(""));
        assert!(!record.matches("p@ss"));
        assert!(!record.matches("recovery"));
    }

    #[test]
    fn attachments_keep_insertion_order_and_default_mime() {
        let now = Utc::now();
        let mut record = sample(now);
        let first = record
            .push_attachment(NewAttachment::new("a.txt", "text/plain", b"a".to_vec()), now)
            .unwrap();
        let second = record
            .push_attachment(NewAttachment::new("b.bin", " ", vec![0, 1, 2]), now)
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(record.attachments[0].id, first);
        assert_eq!(record.attachments[1].id, second);
        assert_eq!(record.attachments[1].mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(record.attachments[1].size_bytes(), 3);
    }

    #[test]
    fn remove_unknown_attachment_is_not_found() {
        let mut record = sample(Utc::now());
        let err = record
            .remove_attachment(AttachmentId::new_random(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[test]
    fn display_size_uses_kilobytes() {
        let attachment = Attachment {
            id: AttachmentId::new_random(),
            name: "scan.pdf".into(),
            mime_type: "application/pdf".into(),
            content: vec![0u8; 1536],
        };
        assert_eq!(attachment.display_size(), "1.5 KB");
    }

    #[test]
    fn update_sets_and_clears_fields() {
        let created = Utc::now();
        let mut record = sample(created);
        let later = created + chrono::Duration::seconds(5);
        CredentialUpdate::default()
            .title("Bank (old)")
            .clear_email()
            .password("n3w")
            .apply_to(&mut record, later)
            .unwrap();
        assert_eq!(record.title, "Bank (old)");
        assert_eq!(record.email, None);
        assert_eq!(record.password.as_deref(), Some("n3w"));
        assert_eq!(record.username.as_deref(), Some("alice"));
        assert_eq!(record.created_at, created);
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn replaced_values_are_wiped_first() {
        use std::cell::Cell;

        struct Tracked<'a>(&'a Cell<bool>);

        impl Zeroize for Tracked<'_> {
            fn zeroize(&mut self) {
                self.0.set(true);
            }
        }

        let (old, new) = (Cell::new(false), Cell::new(false));
        let mut slot = Tracked(&old);
        replace_wiped(&mut slot, Tracked(&new));
        assert!(old.get());
        assert!(!new.get());
        assert!(std::ptr::eq(slot.0, &new));
    }

    #[test]
    fn rejected_update_leaves_record_unchanged() {
        let mut record = sample(Utc::now());
        let before = record.clone();
        let err = CredentialUpdate::default()
            .title("")
            .password("changed")
            .apply_to(&mut record, Utc::now())
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn ids_parse_and_display_round_trip() {
        let id = RecordId::new_random();
        let parsed: RecordId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<AttachmentId>().is_err());
    }

    #[test]
    fn summary_omits_secret_fields() {
        let record = sample(Utc::now());
        let json = serde_json::to_string(&record.summary()).unwrap();
        assert!(json.contains("Bank"));
        assert!(!json.contains("p@ss"));
        assert!(json.contains("\"has_password\":true"));
    }
}
