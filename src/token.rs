//! Encrypted fingerprint tokens.
//!
//! AES-256-GCM with a detached tag. The plaintext is always the 32-byte
//! fingerprint hash; the key comes from [`crate::kdf::derive`]. Nonces are
//! fresh random 12-byte values per seal; reusing a nonce under the same key
//! is a protocol violation on the device side, and the test suite asserts
//! uniqueness across generated tokens.

use crate::error::{CoreError, Result};
use crate::types::Fingerprint;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use byteorder::{ByteOrder, LittleEndian};
use rand::RngCore;

pub const CIPHERTEXT_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// One-shot authentication token. Created fresh per submission on the
/// device; consumed exactly once by the validator and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedToken {
    pub ciphertext: [u8; CIPHERTEXT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub auth_tag: [u8; TAG_LEN],
    pub table_id: u16,
    pub key_index: u16,
}

impl EncryptedToken {
    /// ciphertext 32 || nonce 12 || tag 16 || table_id u16 LE || key_index u16 LE
    pub const WIRE_SIZE: usize = CIPHERTEXT_LEN + NONCE_LEN + TAG_LEN + 2 + 2;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..32].copy_from_slice(&self.ciphertext);
        buf[32..44].copy_from_slice(&self.nonce);
        buf[44..60].copy_from_slice(&self.auth_tag);
        LittleEndian::write_u16(&mut buf[60..62], self.table_id);
        LittleEndian::write_u16(&mut buf[62..64], self.key_index);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != Self::WIRE_SIZE {
            return Err(CoreError::MalformedToken {
                expected: Self::WIRE_SIZE,
                found: data.len(),
            });
        }
        let mut ciphertext = [0u8; CIPHERTEXT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut auth_tag = [0u8; TAG_LEN];
        ciphertext.copy_from_slice(&data[0..32]);
        nonce.copy_from_slice(&data[32..44]);
        auth_tag.copy_from_slice(&data[44..60]);
        Ok(Self {
            ciphertext,
            nonce,
            auth_tag,
            table_id: LittleEndian::read_u16(&data[60..62]),
            key_index: LittleEndian::read_u16(&data[62..64]),
        })
    }
}

/// Encrypt `fingerprint` under `key` with a fresh random nonce.
pub fn seal(
    fingerprint: &Fingerprint,
    key: &[u8; 32],
    table_id: u16,
    key_index: u16,
) -> EncryptedToken {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut buf = *fingerprint;
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buf)
        .expect("32-byte plaintext is within AES-GCM limits");

    EncryptedToken {
        ciphertext: buf,
        nonce,
        auth_tag: tag.into(),
        table_id,
        key_index,
    }
}

/// Decrypt a token. An authentication failure is definitive for the given
/// inputs (wrong table/index combination or tampering), never transient.
pub fn open(token: &EncryptedToken, key: &[u8; 32]) -> Result<Fingerprint> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut buf = token.ciphertext;
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&token.nonce),
            b"",
            &mut buf,
            Tag::from_slice(&token.auth_tag),
        )
        .map_err(|_| CoreError::AuthenticationFailed)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf;

    fn key() -> [u8; 32] {
        kdf::derive(&[9u8; 32], 3).unwrap()
    }

    #[test]
    fn seal_open_round_trip() {
        let fp = [0xABu8; 32];
        let k = key();
        let token = seal(&fp, &k, 2, 3);
        assert_eq!(open(&token, &k).unwrap(), fp);
    }

    #[test]
    fn wrong_key_fails() {
        let fp = [1u8; 32];
        let token = seal(&fp, &key(), 2, 3);
        let other = kdf::derive(&[9u8; 32], 4).unwrap();
        assert!(matches!(
            open(&token, &other),
            Err(CoreError::AuthenticationFailed)
        ));
    }

    #[test]
    fn any_bit_flip_is_detected() {
        let fp = [0x55u8; 32];
        let k = key();
        let token = seal(&fp, &k, 0, 0);

        for byte in 0..CIPHERTEXT_LEN {
            for bit in 0..8 {
                let mut t = token.clone();
                t.ciphertext[byte] ^= 1 << bit;
                assert!(open(&t, &k).is_err(), "ciphertext flip {byte}:{bit}");
            }
        }
        for byte in 0..NONCE_LEN {
            let mut t = token.clone();
            t.nonce[byte] ^= 1;
            assert!(open(&t, &k).is_err(), "nonce flip {byte}");
        }
        for byte in 0..TAG_LEN {
            let mut t = token.clone();
            t.auth_tag[byte] ^= 0x80;
            assert!(open(&t, &k).is_err(), "tag flip {byte}");
        }
    }

    #[test]
    fn nonces_are_unique_across_seals() {
        let fp = [0u8; 32];
        let k = key();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let token = seal(&fp, &k, 0, 0);
            assert!(seen.insert(token.nonce), "nonce reused");
        }
    }

    #[test]
    fn wire_round_trip_and_length_check() {
        let token = seal(&[3u8; 32], &key(), 7, 11);
        let bytes = token.to_bytes();
        assert_eq!(EncryptedToken::from_bytes(&bytes).unwrap(), token);

        let truncated = &bytes[..EncryptedToken::WIRE_SIZE - 1];
        let err = EncryptedToken::from_bytes(truncated).unwrap_err();
        assert!(matches!(err, CoreError::MalformedToken { .. }));
    }
}
