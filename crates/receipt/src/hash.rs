use sha2::{Digest, Sha256};

/// Compute SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode a raw 32-byte hash as a lowercase hex string (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Short content key for debug artifact filenames: the first 16 hex chars
/// of the input's SHA-256. Identical inputs map to the same key.
pub fn artifact_key(data: &[u8]) -> String {
    let hex = to_hex(&sha256_bytes(data));
    hex[..16].to_string()
}
