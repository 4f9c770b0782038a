//! Content fingerprints. Every signature the planner hands out is the hex
//! form of one of these.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// 64 lowercase hex chars.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl From<blake3::Hash> for Hash256 {
    fn from(h: blake3::Hash) -> Self {
        Hash256(*h.as_bytes())
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    blake3::hash(bytes).into()
}

pub fn fingerprint(s: &str) -> String {
    hash_bytes(s.as_bytes()).to_hex()
}

/// Fingerprint of the concatenation of `parts`, without building it.
pub fn fingerprint_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut h = Hasher::new();
    for part in parts {
        h.update(part.as_ref().as_bytes());
    }
    Hash256::from(h.finalize()).to_hex()
}

/// Digest of a serde value through its JSON form. Field order is the
/// struct's declaration order, so equal values hash equally.
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256> {
    let bytes = serde_json::to_vec(v).map_err(|e| Error::Hash(e.to_string()))?;
    Ok(hash_bytes(&bytes))
}
