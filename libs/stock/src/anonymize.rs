use sha2::{Digest, Sha256};

/// Derive the opaque identity token for a caller's network address.
///
/// The token is the lowercase hex SHA-256 of the address bytes. It is stable
/// across requests and processes, and nothing stores the reverse mapping.
pub fn anonymize(network_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(network_address.as_bytes());
    hex::encode(hasher.finalize())
}
