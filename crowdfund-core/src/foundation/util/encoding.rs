use crate::foundation::{EscrowError, Hash32, MAX_MESSAGE_SIZE_BYTES};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding().with_limit(MAX_MESSAGE_SIZE_BYTES as u64)
}

/// Canonical byte encoding used for hashing and signing.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EscrowError> {
    Ok(options().serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EscrowError> {
    Ok(options().deserialize(bytes)?)
}

/// `blake3(domain || encode(value))`.
pub fn hash_with_domain<T: Serialize>(domain: &[u8], value: &T) -> Result<Hash32, EscrowError> {
    let bytes = encode(value)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(&bytes);
    Ok(*hasher.finalize().as_bytes())
}

pub fn parse_hex_32bytes(value: &str) -> Result<Hash32, EscrowError> {
    let trimmed = value.trim().trim_start_matches("0x");
    let bytes = hex::decode(trimmed)?;
    let array: Hash32 = bytes
        .as_slice()
        .try_into()
        .map_err(|_| EscrowError::SerializationError { format: "hex".to_string(), details: format!("expected 32 bytes, got {}", bytes.len()) })?;
    Ok(array)
}
