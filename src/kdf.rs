//! Per-submission key derivation.
//!
//! HKDF-SHA256 with no salt (all-zero per RFC 5869) and
//! `info = big_endian_u32(key_index) || "Birthmark"`. Both sides of the
//! protocol (device firmware and MA) must produce identical bytes for the
//! same `(master_key, key_index)`; any divergence in the info encoding
//! shows up only as universal validation failure, so the encoding here is
//! the normative one.

use crate::error::{CoreError, Result};
use hkdf::Hkdf;
use sha2::Sha256;

/// Domain-separation context appended to the derivation info.
pub const CONTEXT: &[u8] = b"Birthmark";

/// Highest valid key index within a table.
pub const MAX_KEY_INDEX: u16 = crate::types::KEYS_PER_TABLE - 1;

/// Derive the 32-byte submission key for `key_index` under `master_key`.
pub fn derive(master_key: &[u8; 32], key_index: u16) -> Result<[u8; 32]> {
    if key_index > MAX_KEY_INDEX {
        return Err(CoreError::IndexOutOfRange(key_index));
    }

    let mut info = Vec::with_capacity(4 + CONTEXT.len());
    info.extend_from_slice(&(key_index as u32).to_be_bytes());
    info.extend_from_slice(CONTEXT);

    let hk = Hkdf::<Sha256>::new(None, master_key);
    let mut okm = [0u8; 32];
    // 32 bytes is far below the HKDF output bound (255 * 32).
    hk.expand(&info, &mut okm)
        .expect("HKDF output length within bound");
    Ok(okm)
}

/// Slice-accepting variant for callers holding key material of unchecked
/// length (e.g. loaded from a key-table file).
pub fn derive_from_slice(master_key: &[u8], key_index: u16) -> Result<[u8; 32]> {
    let key: &[u8; 32] = master_key
        .try_into()
        .map_err(|_| CoreError::InvalidKeyLength(master_key.len()))?;
    derive(key, key_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let mk = [0x42u8; 32];
        let a = derive(&mk, 17).unwrap();
        let b = derive(&mk, 17).unwrap();
        assert_eq!(a, b);
    }

    // Canonical interoperability vector: any independent implementation of
    // the derivation (device firmware, another MA) must reproduce these
    // exact bytes for the all-zero master key at index 0.
    const CANONICAL_ZERO_KEY_INDEX_0: &str =
        "d5bd264ea28a51c944e81eb31eab7d755623cd7bba2c0cf5253f2668ce870b38";

    #[test]
    fn canonical_vector_reproduced() {
        let key = derive(&[0u8; 32], 0).unwrap();
        assert_eq!(hex::encode(key), CANONICAL_ZERO_KEY_INDEX_0);
    }

    #[test]
    fn published_vector_table_reproduced() {
        let vectors: [([u8; 32], u16, &str); 3] = [
            (
                [0u8; 32],
                1,
                "27d25325c4d850ad8cfea5b336e5409ffd4227f9e23ce8444e9d6ab6c33225a0",
            ),
            (
                [0x42u8; 32],
                999,
                "1d35ac4cdd4156536ba5df666fe931b2074e78ab2b2adcada52bc140a57520bf",
            ),
            (
                [0xFFu8; 32],
                17,
                "7d8ce3093f97ca114fafa23a18536abc098c7c11f8fe55f8f8e100b2c6940bb1",
            ),
        ];
        for (master, index, expected) in vectors {
            let key = derive(&master, index).unwrap();
            assert_eq!(hex::encode(key), expected, "vector for index {index}");
        }
    }

    #[test]
    fn derive_matches_independent_info_encoding() {
        // Re-derive through hkdf directly with a hand-built info buffer.
        // Catches any drift in the normative encoding (endianness, context
        // string) that would otherwise only show up as universal FAIL.
        let mk = [0u8; 32];
        let ours = derive(&mk, 0).unwrap();

        let info: Vec<u8> = [0u8, 0, 0, 0]
            .iter()
            .chain(b"Birthmark".iter())
            .copied()
            .collect();
        let hk = Hkdf::<Sha256>::new(None, &mk);
        let mut expected = [0u8; 32];
        hk.expand(&info, &mut expected).unwrap();

        assert_eq!(ours, expected);
    }

    #[test]
    fn distinct_indices_give_distinct_keys() {
        let mk = [7u8; 32];
        let k0 = derive(&mk, 0).unwrap();
        let k1 = derive(&mk, 1).unwrap();
        assert_ne!(k0, k1);
    }

    #[test]
    fn distinct_masters_give_distinct_keys() {
        let k0 = derive(&[0u8; 32], 5).unwrap();
        let k1 = derive(&[1u8; 32], 5).unwrap();
        assert_ne!(k0, k1);
    }

    #[test]
    fn index_out_of_range_rejected() {
        let err = derive(&[0u8; 32], 1000).unwrap_err();
        assert!(matches!(err, CoreError::IndexOutOfRange(1000)));
        assert!(derive(&[0u8; 32], MAX_KEY_INDEX).is_ok());
    }

    #[test]
    fn slice_variant_enforces_key_length() {
        let err = derive_from_slice(&[0u8; 16], 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidKeyLength(16)));
        assert!(derive_from_slice(&[0u8; 32], 0).is_ok());
    }
}
