use serde::{Deserialize, Serialize};
use std::fmt::Display;

const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Encodes `bytes` as an unsigned big-endian integer in base 62.
///
/// Leading zero bytes do not contribute digits; an all-zero (or empty) input
/// encodes as `"0"`.
pub fn encode(bytes: &[u8]) -> String {
    let mut number: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    let mut digits = Vec::with_capacity(number.len() * 4 / 3 + 1);

    // Schoolbook long division by 62, least significant digit first.
    while !number.is_empty() {
        let mut remainder: u32 = 0;
        let mut quotient = Vec::with_capacity(number.len());
        for &byte in &number {
            let acc = (remainder << 8) | u32::from(byte);
            let q = acc / 62;
            remainder = acc % 62;
            if !quotient.is_empty() || q != 0 {
                quotient.push(q as u8);
            }
        }
        digits.push(ALPHABET[remainder as usize]);
        number = quotient;
    }

    if digits.is_empty() {
        return "0".to_string();
    }

    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

/// A short code derived from a digest and rendered in base 62.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShortCodeBase62(String);

impl ShortCodeBase62 {
    /// Encodes the digest and keeps its `len` most significant base-62 digits.
    ///
    /// Encodings shorter than `len` are kept whole; they are never padded.
    pub fn from_digest<T: AsRef<[u8]>>(digest: T, len: usize) -> Self {
        let mut encoded = encode(digest.as_ref());
        encoded.truncate(len);
        Self(encoded)
    }

    /// Returns the short code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ShortCodeBase62 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ShortCodeBase62").field(&self.0).finish()
    }
}

impl Display for ShortCodeBase62 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ShortCodeBase62 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ShortCodeBase62 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(serde::de::Error::custom(format!(
                "not a base62 short code: '{s}'"
            )));
        }
        Ok(Self(s))
    }
}
