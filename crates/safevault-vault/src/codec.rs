// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Binary record codec.
//!
//! The plaintext sealed inside a container is:
//!
//! ```text
//! u32 record_count
//! record_count x ( u32 body_len | body )
//! ```
//!
//! A body is a run of TLV fields `u8 tag | u32 len | len bytes`, all integers
//! little-endian. Attachments are nested TLV bodies under tag 8. Unknown tags
//! are skipped so newer writers can add fields without a format bump.

use chrono::{DateTime, Utc};
use safevault_core::{Attachment, AttachmentId, CredentialRecord, RecordId, VaultError};
use zeroize::Zeroizing;

mod record_tag {
    pub const ID: u8 = 1;
    pub const TITLE: u8 = 2;
    pub const USERNAME: u8 = 3;
    pub const EMAIL: u8 = 4;
    pub const PASSWORD: u8 = 5;
    pub const NOTES: u8 = 6;
    pub const CREATED_AT: u8 = 7;
    pub const ATTACHMENT: u8 = 8;
    pub const UPDATED_AT: u8 = 9;
}

mod attachment_tag {
    pub const ID: u8 = 1;
    pub const NAME: u8 = 2;
    pub const MIME_TYPE: u8 = 3;
    pub const CONTENT: u8 = 4;
}

const TIMESTAMP_LEN: usize = 12;

/// Serialize records into the plaintext that gets sealed.
///
/// Buffers are sized up front so no plaintext is left behind in a freed
/// allocation when a `Vec` grows.
pub fn encode(records: &[CredentialRecord]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let total = 4 + records.iter().map(|r| 4 + record_len(r)).sum::<usize>();
    let mut out = Zeroizing::new(Vec::with_capacity(total));
    put_u32(&mut out, len_u32(records.len())?);
    for record in records {
        let body = encode_record(record)?;
        put_u32(&mut out, len_u32(body.len())?);
        out.extend_from_slice(&body);
    }
    Ok(out)
}

/// Parse plaintext produced by [`encode`].
///
/// Never drops or truncates a record: any inconsistency is `CorruptData`.
pub fn decode(bytes: &[u8]) -> Result<Vec<CredentialRecord>, VaultError> {
    let mut reader = Reader::new(bytes);
    let count = reader.u32()? as usize;
    // Each record needs at least its length prefix, so a count beyond that is a lie.
    if count > reader.remaining() / 4 {
        return Err(corrupt(format!(
            "record count {count} exceeds available data"
        )));
    }
    let mut records = Vec::with_capacity(count);
    for index in 0..count {
        let body_len = reader.u32()? as usize;
        let body = reader.take(body_len).map_err(|_| {
            corrupt(format!("record {index} body runs past end of data"))
        })?;
        records.push(decode_record(body)?);
    }
    if reader.remaining() != 0 {
        return Err(corrupt(format!(
            "{} trailing bytes after {count} records",
            reader.remaining()
        )));
    }
    Ok(records)
}

fn encode_record(record: &CredentialRecord) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let mut body = Zeroizing::new(Vec::with_capacity(record_len(record)));
    put_field(&mut body, record_tag::ID, record.id.as_bytes())?;
    put_field(&mut body, record_tag::TITLE, record.title.as_bytes())?;
    put_optional(&mut body, record_tag::USERNAME, record.username.as_deref())?;
    put_optional(&mut body, record_tag::EMAIL, record.email.as_deref())?;
    put_optional(&mut body, record_tag::PASSWORD, record.password.as_deref())?;
    put_optional(&mut body, record_tag::NOTES, record.notes.as_deref())?;
    put_field(&mut body, record_tag::CREATED_AT, &timestamp_bytes(&record.created_at))?;
    put_field(&mut body, record_tag::UPDATED_AT, &timestamp_bytes(&record.updated_at))?;
    for attachment in &record.attachments {
        let nested = encode_attachment(attachment)?;
        put_field(&mut body, record_tag::ATTACHMENT, &nested)?;
    }
    Ok(body)
}

fn encode_attachment(attachment: &Attachment) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let mut body = Zeroizing::new(Vec::with_capacity(attachment_len(attachment)));
    put_field(&mut body, attachment_tag::ID, attachment.id.as_bytes())?;
    put_field(&mut body, attachment_tag::NAME, attachment.name.as_bytes())?;
    put_field(&mut body, attachment_tag::MIME_TYPE, attachment.mime_type.as_bytes())?;
    put_field(&mut body, attachment_tag::CONTENT, &attachment.content)?;
    Ok(body)
}

/// Tag byte plus `u32` length prefix.
const FIELD_HEADER_LEN: usize = 1 + 4;

fn field_len(value_len: usize) -> usize {
    FIELD_HEADER_LEN + value_len
}

fn record_len(record: &CredentialRecord) -> usize {
    let optional = |value: &Option<String>| value.as_ref().map_or(0, |v| field_len(v.len()));
    field_len(record.id.as_bytes().len())
        + field_len(record.title.len())
        + optional(&record.username)
        + optional(&record.email)
        + optional(&record.password)
        + optional(&record.notes)
        + 2 * field_len(TIMESTAMP_LEN)
        + record
            .attachments
            .iter()
            .map(|a| field_len(attachment_len(a)))
            .sum::<usize>()
}

fn attachment_len(attachment: &Attachment) -> usize {
    field_len(attachment.id.as_bytes().len())
        + field_len(attachment.name.len())
        + field_len(attachment.mime_type.len())
        + field_len(attachment.content.len())
}

fn decode_record(body: &[u8]) -> Result<CredentialRecord, VaultError> {
    let mut id = None;
    let mut title = None;
    let mut username = None;
    let mut email = None;
    let mut password = None;
    let mut notes = None;
    let mut created_at = None;
    let mut updated_at = None;
    let mut attachments = Vec::new();

    let mut reader = Reader::new(body);
    while reader.remaining() > 0 {
        let (tag, value) = reader.field()?;
        match tag {
            record_tag::ID => set_once(&mut id, "record id", RecordId::from_bytes(uuid_bytes(value)?))?,
            record_tag::TITLE => set_once(&mut title, "title", utf8(value, "title")?)?,
            record_tag::USERNAME => set_once(&mut username, "username", utf8(value, "username")?)?,
            record_tag::EMAIL => set_once(&mut email, "email", utf8(value, "email")?)?,
            record_tag::PASSWORD => set_once(&mut password, "password", utf8(value, "password")?)?,
            record_tag::NOTES => set_once(&mut notes, "notes", utf8(value, "notes")?)?,
            record_tag::CREATED_AT => set_once(&mut created_at, "created_at", timestamp(value)?)?,
            record_tag::UPDATED_AT => set_once(&mut updated_at, "updated_at", timestamp(value)?)?,
            record_tag::ATTACHMENT => attachments.push(decode_attachment(value)?),
            _ => {}
        }
    }

    let id = id.ok_or_else(|| corrupt("record is missing its id"))?;
    let title = title.ok_or_else(|| corrupt(format!("record {id} is missing its title")))?;
    let created_at =
        created_at.ok_or_else(|| corrupt(format!("record {id} is missing created_at")))?;

    Ok(CredentialRecord {
        id,
        title,
        username,
        email,
        password,
        notes,
        attachments,
        created_at,
        updated_at: updated_at.unwrap_or(created_at),
    })
}

fn decode_attachment(body: &[u8]) -> Result<Attachment, VaultError> {
    let mut id = None;
    let mut name = None;
    let mut mime_type = None;
    let mut content = None;

    let mut reader = Reader::new(body);
    while reader.remaining() > 0 {
        let (tag, value) = reader.field()?;
        match tag {
            attachment_tag::ID => set_once(
                &mut id,
                "attachment id",
                AttachmentId::from_bytes(uuid_bytes(value)?),
            )?,
            attachment_tag::NAME => set_once(&mut name, "attachment name", utf8(value, "attachment name")?)?,
            attachment_tag::MIME_TYPE => {
                set_once(&mut mime_type, "mime type", utf8(value, "mime type")?)?
            }
            attachment_tag::CONTENT => set_once(&mut content, "attachment content", value.to_vec())?,
            _ => {}
        }
    }

    let missing = |field: &str| corrupt(format!("attachment is missing its {field}"));
    Ok(Attachment {
        id: id.ok_or_else(|| missing("id"))?,
        name: name.ok_or_else(|| missing("name"))?,
        mime_type: mime_type.ok_or_else(|| missing("mime type"))?,
        content: content.ok_or_else(|| missing("content"))?,
    })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], VaultError> {
        if len > self.remaining() {
            return Err(corrupt(format!(
                "length {len} runs past end of data ({} bytes left)",
                self.remaining()
            )));
        }
        let buf: &'a [u8] = self.buf;
        let slice = &buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, VaultError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, VaultError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn field(&mut self) -> Result<(u8, &'a [u8]), VaultError> {
        let tag = self.u8()?;
        let len = self.u32()? as usize;
        let value = self
            .take(len)
            .map_err(|_| corrupt(format!("field {tag} runs past end of record")))?;
        Ok((tag, value))
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_field(out: &mut Vec<u8>, tag: u8, value: &[u8]) -> Result<(), VaultError> {
    out.push(tag);
    put_u32(out, len_u32(value.len())?);
    out.extend_from_slice(value);
    Ok(())
}

fn put_optional(out: &mut Vec<u8>, tag: u8, value: Option<&str>) -> Result<(), VaultError> {
    match value {
        Some(v) => put_field(out, tag, v.as_bytes()),
        None => Ok(()),
    }
}

fn len_u32(len: usize) -> Result<u32, VaultError> {
    u32::try_from(len)
        .map_err(|_| VaultError::InvalidInput(format!("{len} bytes exceeds the 4 GiB field limit")))
}

fn timestamp_bytes(at: &DateTime<Utc>) -> [u8; TIMESTAMP_LEN] {
    let mut out = [0u8; TIMESTAMP_LEN];
    out[..8].copy_from_slice(&at.timestamp().to_le_bytes());
    out[8..].copy_from_slice(&at.timestamp_subsec_nanos().to_le_bytes());
    out
}

fn timestamp(value: &[u8]) -> Result<DateTime<Utc>, VaultError> {
    let bytes: [u8; TIMESTAMP_LEN] = value
        .try_into()
        .map_err(|_| corrupt(format!("timestamp must be {TIMESTAMP_LEN} bytes, got {}", value.len())))?;
    let mut secs = [0u8; 8];
    secs.copy_from_slice(&bytes[..8]);
    let mut nanos = [0u8; 4];
    nanos.copy_from_slice(&bytes[8..]);
    DateTime::from_timestamp(i64::from_le_bytes(secs), u32::from_le_bytes(nanos))
        .ok_or_else(|| corrupt("timestamp out of range"))
}

fn uuid_bytes(value: &[u8]) -> Result<[u8; 16], VaultError> {
    value
        .try_into()
        .map_err(|_| corrupt(format!("id must be 16 bytes, got {}", value.len())))
}

fn utf8(value: &[u8], field: &str) -> Result<String, VaultError> {
    String::from_utf8(value.to_vec()).map_err(|_| corrupt(format!("{field} is not valid UTF-8")))
}

fn set_once<T>(slot: &mut Option<T>, field: &str, value: T) -> Result<(), VaultError> {
    if slot.is_some() {
        return Err(corrupt(format!("duplicate {field} field")));
    }
    *slot = Some(value);
    Ok(())
}

fn corrupt(message: impl Into<String>) -> VaultError {
    VaultError::CorruptData(message.into())
}
