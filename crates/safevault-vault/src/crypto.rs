// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-level AES-256-GCM seal/open operations.
//!
//! A [`Nonce`] can only be obtained from [`Nonce::generate`] and is consumed by
//! [`seal_with_nonce`], so the same nonce value cannot be handed to the cipher
//! twice. Nonce reuse would be catastrophic for GCM security.

use ring::aead::{self, Aad, LessSafeKey, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use safevault_core::VaultError;
use zeroize::Zeroizing;

use crate::kdf::VaultKey;

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// A single-use nonce drawn from the system CSPRNG.
///
/// Not `Clone` or `Copy`: sealing consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    pub fn generate() -> Result<Self, VaultError> {
        let mut bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| VaultError::Internal("failed to generate random nonce".to_string()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

/// Ciphertext (tag included) plus the nonce needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

fn less_safe_key(key: &VaultKey) -> Result<LessSafeKey, VaultError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key.as_bytes())
        .map_err(|_| VaultError::Internal("failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt under a freshly generated nonce.
pub fn seal(key: &VaultKey, plaintext: &[u8], aad: &[u8]) -> Result<SealedBox, VaultError> {
    seal_with_nonce(key, Nonce::generate()?, plaintext, aad)
}

/// Encrypt under a caller-generated nonce, consuming it.
///
/// `aad` is authenticated but not encrypted; the same bytes must be supplied to [`open`].
pub fn seal_with_nonce(
    key: &VaultKey,
    nonce: Nonce,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedBox, VaultError> {
    let less_safe = less_safe_key(key)?;
    let nonce_bytes = nonce.0;

    // Seal in place: plaintext buffer is extended with the authentication tag.
    let mut in_out = Vec::with_capacity(plaintext.len() + TAG_LEN);
    in_out.extend_from_slice(plaintext);
    less_safe
        .seal_in_place_append_tag(
            aead::Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(aad),
            &mut in_out,
        )
        .map_err(|_| VaultError::Internal("AES-256-GCM encryption failed".to_string()))?;

    Ok(SealedBox {
        nonce: nonce_bytes,
        ciphertext: in_out,
    })
}

/// Decrypt and authenticate.
///
/// Any mismatch of key, nonce, associated data, or ciphertext yields
/// `AuthenticationFailed`; no plaintext is returned in that case.
pub fn open(
    key: &VaultKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let less_safe = less_safe_key(key)?;

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = less_safe
        .open_in_place(
            aead::Nonce::assume_unique_for_key(*nonce),
            Aad::from(aad),
            in_out.as_mut_slice(),
        )
        .map_err(|_| VaultError::AuthenticationFailed)?
        .len();

    // Truncation zeroes nothing by itself; the tag bytes are not secret.
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = VaultKey::generate().unwrap();
        let sealed = seal(&key, b"p@ss", b"header").unwrap();
        let opened = open(&key, &sealed.nonce, &sealed.ciphertext, b"header").unwrap();
        assert_eq!(opened.as_slice(), b"p@ss");
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = VaultKey::generate().unwrap();
        let sealed = seal(&key, b"", b"").unwrap();
        assert_eq!(sealed.ciphertext.len(), TAG_LEN);
        assert!(open(&key, &sealed.nonce, &sealed.ciphertext, b"").unwrap().is_empty());
    }

    #[test]
    fn seal_produces_different_ciphertext_for_same_plaintext() {
        let key = VaultKey::generate().unwrap();
        let first = seal(&key, b"same input twice", b"").unwrap();
        let second = seal(&key, b"same input twice", b"").unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let sealed = seal(&VaultKey::generate().unwrap(), b"secret data", b"").unwrap();
        let other = VaultKey::generate().unwrap();
        let err = open(&other, &sealed.nonce, &sealed.ciphertext, b"").unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
    }

    #[test]
    fn open_with_wrong_nonce_fails() {
        let key = VaultKey::generate().unwrap();
        let sealed = seal(&key, b"secret data", b"").unwrap();
        let mut nonce = sealed.nonce;
        nonce[0] ^= 0x80;
        let err = open(&key, &nonce, &sealed.ciphertext, b"").unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
    }

    #[test]
    fn open_with_wrong_aad_fails() {
        let key = VaultKey::generate().unwrap();
        let sealed = seal(&key, b"secret data", b"v1").unwrap();
        let err = open(&key, &sealed.nonce, &sealed.ciphertext, b"v2").unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let key = VaultKey::generate().unwrap();
        let sealed = seal(&key, b"secret data", b"").unwrap();
        let short = &sealed.ciphertext[..TAG_LEN - 1];
        assert!(matches!(
            open(&key, &sealed.nonce, short, b""),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn ciphertext_is_plaintext_plus_tag() {
        let key = VaultKey::generate().unwrap();
        let sealed = seal(&key, b"hello", b"").unwrap();
        assert_eq!(sealed.ciphertext.len(), 5 + TAG_LEN);
    }

    #[test]
    fn seal_with_nonce_records_that_nonce() {
        let key = VaultKey::generate().unwrap();
        let nonce = Nonce::generate().unwrap();
        let expected = *nonce.as_bytes();
        let sealed = seal_with_nonce(&key, nonce, b"x", b"").unwrap();
        assert_eq!(sealed.nonce, expected);
    }

    #[test]
    fn nonces_are_unique_across_many_seals() {
        let key = VaultKey::generate().unwrap();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let sealed = seal(&key, b"x", b"").unwrap();
            assert!(seen.insert(sealed.nonce), "nonce repeated");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_single_bit_flip_is_detected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..256),
            bit in any::<usize>(),
        ) {
            let key = VaultKey::generate().unwrap();
            let sealed = seal(&key, &plaintext, b"aad").unwrap();
            let mut tampered = sealed.ciphertext.clone();
            let bit = bit % (tampered.len() * 8);
            tampered[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(matches!(
                open(&key, &sealed.nonce, &tampered, b"aad"),
                Err(VaultError::AuthenticationFailed)
            ));
        }

        #[test]
        fn any_plaintext_roundtrips(plaintext in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let key = VaultKey::generate().unwrap();
            let sealed = seal(&key, &plaintext, b"").unwrap();
            let opened = open(&key, &sealed.nonce, &sealed.ciphertext, b"").unwrap();
            prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
        }
    }
}
