//! Compact, sortable-by-creation identifiers for shared code blobs.
//!
//! Grounded on `original_source/shortid/shortid.go`: a 6-byte id made of a
//! big-endian millisecond timestamp and a 2-byte counter, seeded at process
//! start from OS randomness so ids from two restarts don't collide on the
//! counter alone. The base58 alphabet in `original_source/pkg/shortid/`
//! could not be recovered — only its test file survived the distillation,
//! not `base58.go` itself — so this is the standard Bitcoin/IPFS alphabet,
//! implemented with its own round-trip test vectors rather than the
//! unrecoverable original ones.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;

use rand::RngCore;

use crate::error::CoreError;

const ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

static COUNTER: LazyLock<AtomicU32> = LazyLock::new(|| AtomicU32::new(rand::rngs::OsRng.next_u32()));

/// A 6-byte identifier: 4-byte millisecond timestamp, 2-byte counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortId([u8; 6]);

impl ShortId {
    pub fn new() -> Self {
        let millis = chrono::Utc::now().timestamp_millis() as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_add(1) as u16;
        let mut id = [0u8; 6];
        id[0..4].copy_from_slice(&millis.to_be_bytes());
        id[4..6].copy_from_slice(&count.to_be_bytes());
        ShortId(id)
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let decoded = decode(s);
        let bytes: [u8; 6] = decoded
            .try_into()
            .map_err(|_| CoreError::BadRequest(format!("invalid shortid: {s}")))?;
        Ok(ShortId(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Default for ShortId {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::cache::CacheKey for ShortId {
    fn hash(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::fmt::Display for ShortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&encode(&self.0))
    }
}

impl std::str::FromStr for ShortId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShortId::parse(s)
    }
}

/// Encodes `input` as base58, preserving one alphabet-zero character per
/// leading zero byte.
pub fn encode(input: &[u8]) -> String {
    let zero_count = input.iter().take_while(|&&b| b == 0).count();
    let mut digits: Vec<u8> = Vec::with_capacity(input.len() * 138 / 100 + 1);
    for &byte in input {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            carry += (*d as u32) << 8;
            *d = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }
    let mut out = String::with_capacity(zero_count + digits.len());
    out.extend(std::iter::repeat(ALPHABET[0] as char).take(zero_count));
    out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize] as char));
    out
}

/// Decodes a base58 string. Returns an empty vec for input containing any
/// character outside the alphabet, mirroring the original's permissive
/// `decode` (validity is instead checked by callers on decoded length).
pub fn decode(s: &str) -> Vec<u8> {
    if s.is_empty() {
        return Vec::new();
    }
    let zero_char = ALPHABET[0] as char;
    let zero_count = s.chars().take_while(|&c| c == zero_char).count();
    let mut bytes: Vec<u8> = Vec::with_capacity(s.len());
    for c in s.chars() {
        let Some(val) = ALPHABET.iter().position(|&a| a as char == c) else {
            return Vec::new();
        };
        let mut carry = val as u32;
        for b in bytes.iter_mut() {
            carry += (*b as u32) * 58;
            *b = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    let mut out = vec![0u8; zero_count];
    out.extend(bytes.iter().rev());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn base58_round_trips() {
        let cases: &[&[u8]] = &[
            b"",
            b"foo",
            b"quick brown fox jumped over lazy dog",
            &[0, 0, 0, 0, 0],
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
        ];
        for case in cases {
            let encoded = encode(case);
            assert_eq!(decode(&encoded), *case, "round trip for {case:?}");
        }
    }

    #[test]
    fn base58_leading_zeros_preserved() {
        assert_eq!(encode(&[0, 0, 0]), "111");
        assert_eq!(decode("111"), vec![0, 0, 0]);
    }

    #[test]
    fn base58_decode_rejects_unknown_chars() {
        assert!(decode("0OIl").is_empty());
    }

    #[test]
    fn shortid_unique_and_round_trips() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = ShortId::new();
            let s = id.to_string();
            assert!(seen.insert(s.clone()), "non-unique id: {s}");
            let parsed = ShortId::parse(&s).unwrap();
            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn shortid_parse_invalid_length_errors() {
        assert!(ShortId::parse("abcdef").is_err());
    }
}
