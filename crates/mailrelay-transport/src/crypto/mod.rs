//! Per-session payload encryption.
//!
//! AES-256-CBC with PKCS7 padding; a fresh random IV is drawn from the
//! OS entropy source for every message. Key material comes from an
//! injected [`KeyProvider`], never from a compile-time constant, and is
//! zeroized when dropped.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Symmetric key size in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// A per-session symmetric key.
///
/// Zeroized on drop. The raw bytes are never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error unless the slice is exactly [`KEY_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKey(format!("expected {KEY_SIZE} bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Generates a random key from the OS entropy source.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Message initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_SIZE]);

impl Iv {
    /// Creates an IV from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Draws a fresh random IV from the OS entropy source.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the raw IV bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

/// Source of per-session key material.
///
/// Injected at session creation. The static implementation wraps
/// out-of-band-provisioned key material from configuration; a
/// negotiated-key provider plugs in behind the same trait.
pub trait KeyProvider: Send + Sync {
    /// Returns the key for a new session.
    fn session_key(&self) -> SessionKey;
}

/// Key provider backed by configured key material.
///
/// Every session created from one provider shares this key, which is
/// only appropriate when the material is rotated out of band.
#[derive(Clone)]
pub struct StaticKeyProvider {
    key: SessionKey,
}

impl StaticKeyProvider {
    /// Creates a provider from configured key material.
    ///
    /// # Errors
    ///
    /// Returns an error unless the material is exactly [`KEY_SIZE`]
    /// bytes.
    pub fn new(material: &[u8]) -> Result<Self> {
        Ok(Self {
            key: SessionKey::from_slice(material)?,
        })
    }
}

impl KeyProvider for StaticKeyProvider {
    fn session_key(&self) -> SessionKey {
        self.key.clone()
    }
}

/// Encrypts a message body with a fresh random IV.
///
/// Returns the IV and the PKCS7-padded ciphertext; the wire layer
/// concatenates them and appends the payload terminator.
#[must_use]
pub fn encrypt_body(key: &SessionKey, plaintext: &[u8]) -> (Iv, Vec<u8>) {
    let iv = Iv::random();
    let encryptor = Aes256CbcEnc::new(key.as_bytes().into(), iv.as_bytes().into());
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    (iv, ciphertext)
}

/// Decrypts a message body.
///
/// # Errors
///
/// Fails with the opaque [`Error::Decryption`] on truncated input,
/// misaligned input, or padding mismatch alike; no partial plaintext
/// is ever returned and the error does not distinguish the causes.
pub fn decrypt_body(key: &SessionKey, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(Error::Decryption);
    }
    let decryptor = Aes256CbcDec::new(key.as_bytes().into(), iv.as_bytes().into());
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::Decryption)
}

/// Splits a wire payload into IV and ciphertext.
///
/// # Errors
///
/// Fails with [`Error::Decryption`] when the payload is shorter than
/// one IV plus one block.
pub fn split_payload(payload: &[u8]) -> Result<(Iv, &[u8])> {
    if payload.len() < IV_SIZE + BLOCK_SIZE {
        return Err(Error::Decryption);
    }
    let (iv_bytes, ciphertext) = payload.split_at(IV_SIZE);
    let arr: [u8; IV_SIZE] = iv_bytes.try_into().map_err(|_| Error::Decryption)?;
    Ok((Iv::from_bytes(arr), ciphertext))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    fn test_key() -> SessionKey {
        SessionKey::from_bytes([0x2a; KEY_SIZE])
    }

    #[test]
    fn round_trip() {
        let key = test_key();
        let plaintext = b"subject\nbody of the message";
        let (iv, ciphertext) = encrypt_body(&key, plaintext);
        let decrypted = decrypt_body(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn round_trip_empty_plaintext() {
        let key = test_key();
        let (iv, ciphertext) = encrypt_body(&key, b"");
        // PKCS7 always adds a padding block.
        assert_eq!(ciphertext.len(), BLOCK_SIZE);
        assert_eq!(decrypt_body(&key, &iv, &ciphertext).unwrap(), b"");
    }

    #[test]
    fn ivs_never_repeat() {
        let key = test_key();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let (iv, _) = encrypt_body(&key, b"same message");
            assert!(seen.insert(*iv.as_bytes()), "IV collision");
        }
    }

    #[test]
    fn ciphertext_differs_per_message() {
        let key = test_key();
        let (_, c1) = encrypt_body(&key, b"same message");
        let (_, c2) = encrypt_body(&key, b"same message");
        assert_ne!(c1, c2);
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let key = test_key();
        let (iv, ciphertext) = encrypt_body(&key, b"some plaintext");
        // Fewer bytes than one cipher block.
        let truncated = &ciphertext[..BLOCK_SIZE - 1];
        assert!(matches!(
            decrypt_body(&key, &iv, truncated),
            Err(Error::Decryption)
        ));
    }

    #[test]
    fn empty_ciphertext_fails() {
        let key = test_key();
        assert!(matches!(
            decrypt_body(&key, &Iv::random(), b""),
            Err(Error::Decryption)
        ));
    }

    #[test]
    fn tampered_padding_fails() {
        let key = test_key();
        let (iv, mut ciphertext) = encrypt_body(&key, b"some plaintext");
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;
        assert!(matches!(
            decrypt_body(&key, &iv, &ciphertext),
            Err(Error::Decryption)
        ));
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let key_a = SessionKey::random();
        let key_b = SessionKey::random();
        let (iv, ciphertext) = encrypt_body(&key_a, b"isolated session payload");
        let result = decrypt_body(&key_b, &iv, &ciphertext);
        // Either padding fails or the plaintext is garbage.
        if let Ok(plaintext) = result {
            assert_ne!(plaintext, b"isolated session payload");
        }
    }

    #[test]
    fn split_payload_layout() {
        let key = test_key();
        let (iv, ciphertext) = encrypt_body(&key, b"hello");
        let mut wire = Vec::new();
        wire.extend_from_slice(iv.as_bytes());
        wire.extend_from_slice(&ciphertext);

        let (parsed_iv, parsed_ct) = split_payload(&wire).unwrap();
        assert_eq!(parsed_iv, iv);
        assert_eq!(parsed_ct, ciphertext);
    }

    #[test]
    fn split_payload_rejects_short_input() {
        assert!(split_payload(&[0u8; IV_SIZE]).is_err());
        assert!(split_payload(&[0u8; IV_SIZE + BLOCK_SIZE - 1]).is_err());
    }

    #[test]
    fn static_provider_requires_exact_length() {
        assert!(StaticKeyProvider::new(&[0u8; KEY_SIZE]).is_ok());
        assert!(StaticKeyProvider::new(&[0u8; KEY_SIZE - 1]).is_err());
        assert!(StaticKeyProvider::new(&[]).is_err());
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = SessionKey::from_bytes([0xaa; KEY_SIZE]);
        assert_eq!(format!("{key:?}"), "SessionKey(..)");
    }

    proptest! {
        #[test]
        fn round_trip_law(body in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let key = test_key();
            let (iv, ciphertext) = encrypt_body(&key, &body);
            prop_assert_eq!(decrypt_body(&key, &iv, &ciphertext).unwrap(), body);
        }
    }
}
