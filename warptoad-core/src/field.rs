//! BN254 scalar encoding helpers.
//!
//! Every record that crosses a ledger, a message or a proof boundary carries
//! field elements as [`FieldBytes`]: the 32-byte little-endian canonical
//! representation, serialized as a `0x`-prefixed hex string.

use std::fmt;

use halo2curves_axiom::{bn256::Fr, ff::PrimeField};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, WarpToadError};

/// Canonical little-endian encoding of a BN254 scalar.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldBytes(pub [u8; 32]);

impl FieldBytes {
    pub const ZERO: FieldBytes = FieldBytes([0u8; 32]);

    pub fn from_fr(fr: &Fr) -> Self {
        Self(fr_to_bytes(fr))
    }

    pub fn to_fr(&self) -> Result<Fr> {
        fr_from_bytes(&self.0)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_fr(&Fr::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        Self::from_fr(&fr_from_u128(value))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse a hex string and reject encodings outside the field.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim_start_matches("0x"))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
            WarpToadError::InvalidFieldElement(format!("expected 32 bytes, got {}", v.len()))
        })?;
        fr_from_bytes(&bytes)?;
        Ok(Self(bytes))
    }
}

impl From<Fr> for FieldBytes {
    fn from(fr: Fr) -> Self {
        Self::from_fr(&fr)
    }
}

impl fmt::Debug for FieldBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldBytes({})", self.to_hex())
    }
}

impl fmt::Display for FieldBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for FieldBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FieldBytes::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A 20-byte account address, embedded into the field as a big-endian integer.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Deterministic address derived from a label, for sandboxes and tests.
    pub fn derive(label: &str) -> Self {
        let digest = blake3::derive_key("warptoad address v1", label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }

    pub fn to_fr(&self) -> Fr {
        reduce_be_bytes_to_fr(&self.0)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim_start_matches("0x"))?;
        let bytes: [u8; 20] = raw.try_into().map_err(|v: Vec<u8>| {
            WarpToadError::InvalidFieldElement(format!("expected 20 address bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(de::Error::custom)
    }
}

pub fn fr_from_bytes(bytes: &[u8; 32]) -> Result<Fr> {
    Fr::from_bytes(bytes)
        .into_option()
        .ok_or_else(|| WarpToadError::InvalidFieldElement("invalid bn256 scalar encoding".into()))
}

pub fn fr_to_bytes(fr: &Fr) -> [u8; 32] {
    let repr = fr.to_repr();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(repr.as_ref());
    bytes
}

pub fn fr_from_u128(value: u128) -> Fr {
    let shift = Fr::from(u64::MAX) + Fr::one();
    Fr::from((value >> 64) as u64) * shift + Fr::from(value as u64)
}

pub fn reduce_be_bytes_to_fr(bytes: &[u8]) -> Fr {
    let mut acc = Fr::zero();
    let base = Fr::from(256);
    for byte in bytes.iter() {
        acc = acc * base + Fr::from(*byte as u64);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fr_bytes_round_trip() {
        let value = Fr::from(2024u64);
        let bytes = fr_to_bytes(&value);
        assert_eq!(fr_from_bytes(&bytes).unwrap(), value);
    }

    #[test]
    fn u128_embedding_matches_little_endian_bytes() {
        let amount: u128 = 5 * 10u128.pow(18) + (7u128 << 80);
        let mut expected = [0u8; 32];
        expected[..16].copy_from_slice(&amount.to_le_bytes());
        assert_eq!(FieldBytes::from_u128(amount).0, expected);
    }

    #[test]
    fn rejects_non_canonical_encoding() {
        let all_ones = format!("0x{}", "ff".repeat(32));
        assert!(matches!(
            FieldBytes::from_hex(&all_ones),
            Err(WarpToadError::InvalidFieldElement(_))
        ));
    }

    #[test]
    fn field_bytes_serde_uses_hex() {
        let value = FieldBytes::from_u64(4321);
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.starts_with("\"0x"));
        let back: FieldBytes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn address_embeds_big_endian() {
        let mut raw = [0u8; 20];
        raw[19] = 0x01;
        raw[18] = 0x02;
        assert_eq!(Address(raw).to_fr(), Fr::from(0x0201u64));
        assert_ne!(Address::derive("relayer"), Address::derive("recipient"));
    }
}
