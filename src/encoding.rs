//! Serde adapters that carry binary fields as standard base64 strings.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
use zeroize::Zeroizing;

fn decode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Zeroizing<Vec<u8>>, D::Error> {
    let encoded = Zeroizing::new(String::deserialize(deserializer)?);
    STANDARD
        .decode(encoded.as_bytes())
        .map(Zeroizing::new)
        .map_err(D::Error::custom)
}

fn decode_array<'de, D: Deserializer<'de>, const N: usize>(
    deserializer: D,
) -> Result<[u8; N], D::Error> {
    let bytes = decode(deserializer)?;
    let len = bytes.len();
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| D::Error::custom(format!("expected {N} bytes, got {len}")))
}

/// `Vec<u8>` as base64.
pub mod bytes {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        decode(deserializer).map(|bytes| bytes.to_vec())
    }
}

/// `[u8; 12]` nonces as base64.
pub mod nonce {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8; 12], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 12], D::Error> {
        decode_array(deserializer)
    }
}

/// `[u8; 32]` secrets as base64. The intermediate string is wiped.
pub mod key32 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(STANDARD.encode(value));
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        decode_array(deserializer)
    }
}
