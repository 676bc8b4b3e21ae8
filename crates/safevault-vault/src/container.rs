// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persisted vault container and its byte layout.
//!
//! ```text
//! magic          4 bytes  "SFVT"
//! format_version u16
//! kdf_algorithm  u8
//! kdf_m_cost     u32      KiB
//! kdf_t_cost     u32
//! kdf_p_cost     u32
//! salt_len       u8
//! salt           salt_len bytes
//! nonce          12 bytes
//! ct_len         u32
//! ciphertext     ct_len bytes
//! ```
//!
//! Integers are little-endian. Everything up to and including the nonce is
//! the header, which is passed to the cipher as associated data.

use safevault_core::{CredentialRecord, VaultError};

use crate::codec;
use crate::crypto::{self, Nonce, NONCE_LEN, TAG_LEN};
use crate::kdf::{KdfAlgorithm, KdfParams, VaultKey, SALT_LEN};

/// Leading bytes of every container.
pub const MAGIC: [u8; 4] = *b"SFVT";

/// The only container version this build reads and writes.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the header (associated data) in bytes.
pub const HEADER_LEN: usize = 4 + 2 + 1 + 4 + 4 + 4 + 1 + SALT_LEN + NONCE_LEN;

/// One encrypted vault: KDF parameters, salt, nonce, and the sealed record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultContainer {
    pub format_version: u16,
    pub kdf: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl VaultContainer {
    /// Encode and seal `records` under `key` with a fresh nonce.
    pub fn seal_records(
        key: &VaultKey,
        salt: [u8; SALT_LEN],
        kdf: KdfParams,
        records: &[CredentialRecord],
    ) -> Result<Self, VaultError> {
        let plaintext = codec::encode(records)?;
        let nonce = Nonce::generate()?;
        let header = header_bytes(FORMAT_VERSION, &kdf, &salt, nonce.as_bytes());
        let sealed = crypto::seal_with_nonce(key, nonce, &plaintext, &header)?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            kdf,
            salt,
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
        })
    }

    /// Authenticate, decrypt, and decode the record set.
    pub fn open_records(&self, key: &VaultKey) -> Result<Vec<CredentialRecord>, VaultError> {
        let plaintext = crypto::open(key, &self.nonce, &self.ciphertext, &self.header())?;
        codec::decode(&plaintext)
    }

    /// The associated data bound to the ciphertext.
    pub fn header(&self) -> Vec<u8> {
        header_bytes(self.format_version, &self.kdf, &self.salt, &self.nonce)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        let ct_len = u32::try_from(self.ciphertext.len()).map_err(|_| {
            VaultError::InvalidInput("vault exceeds the 4 GiB container limit".to_string())
        })?;
        let mut out = self.header();
        out.reserve(4 + self.ciphertext.len());
        out.extend_from_slice(&ct_len.to_le_bytes());
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    /// Structurally validate and parse container bytes. Does not decrypt.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        let mut cursor = Cursor { buf: bytes, pos: 0 };

        if cursor.take(4)? != MAGIC {
            return Err(corrupt("not a SafeVault container (bad magic)"));
        }
        let format_version = u16::from_le_bytes(cursor.array()?);
        if format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported container format version {format_version}"
            )));
        }
        let algorithm_id = cursor.take(1)?[0];
        let algorithm = KdfAlgorithm::from_id(algorithm_id)
            .ok_or_else(|| corrupt(format!("unknown KDF algorithm {algorithm_id}")))?;
        let kdf = KdfParams {
            algorithm,
            memory_cost_kib: u32::from_le_bytes(cursor.array()?),
            iterations: u32::from_le_bytes(cursor.array()?),
            parallelism: u32::from_le_bytes(cursor.array()?),
        };
        kdf.validate()
            .map_err(|e| corrupt(format!("container KDF parameters rejected: {e}")))?;

        let salt_len = cursor.take(1)?[0] as usize;
        if salt_len != SALT_LEN {
            return Err(corrupt(format!(
                "salt length {salt_len}, expected {SALT_LEN}"
            )));
        }
        let salt: [u8; SALT_LEN] = cursor.array()?;
        let nonce: [u8; NONCE_LEN] = cursor.array()?;

        let ct_len = u32::from_le_bytes(cursor.array()?) as usize;
        if ct_len < TAG_LEN {
            return Err(corrupt(format!(
                "ciphertext of {ct_len} bytes is shorter than the authentication tag"
            )));
        }
        let ciphertext = cursor.take(ct_len)?.to_vec();
        if cursor.pos != bytes.len() {
            return Err(corrupt(format!(
                "{} trailing bytes after ciphertext",
                bytes.len() - cursor.pos
            )));
        }

        Ok(Self {
            format_version,
            kdf,
            salt,
            nonce,
            ciphertext,
        })
    }
}

fn header_bytes(
    format_version: u16,
    kdf: &KdfParams,
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&format_version.to_le_bytes());
    out.push(kdf.algorithm.id());
    out.extend_from_slice(&kdf.memory_cost_kib.to_le_bytes());
    out.extend_from_slice(&kdf.iterations.to_le_bytes());
    out.extend_from_slice(&kdf.parallelism.to_le_bytes());
    out.push(SALT_LEN as u8);
    out.extend_from_slice(salt);
    out.extend_from_slice(nonce);
    out
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], VaultError> {
        let buf: &'a [u8] = self.buf;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= buf.len())
            .ok_or_else(|| corrupt("container is truncated"))?;
        let slice = &buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], VaultError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

fn corrupt(message: impl Into<String>) -> VaultError {
    VaultError::CorruptData(message.into())
}
