//! Block header assembly for candidate digests

use crate::hash_types::{double_sha256, Hash256};
use serde::{Deserialize, Serialize};

/// Serialized header length in bytes
pub const HEADER_LEN: usize = 80;

/// The nonce-independent part of a block header.
///
/// Built once per work unit; `to_bytes` stamps a nonce into the serialized
/// form for each digest evaluation. Integer fields are little-endian in the
/// serialized layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkHeader {
    pub version: u32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
}

impl WorkHeader {
    /// Serialize the 80-byte header with the given nonce.
    pub fn to_bytes(&self, nonce: u32) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..36].copy_from_slice(self.prev_hash.as_bytes());
        bytes[36..68].copy_from_slice(self.merkle_root.as_bytes());
        bytes[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
        bytes[76..80].copy_from_slice(&nonce.to_le_bytes());
        bytes
    }
}

/// Fold the coinbase and merkle branches into the merkle root.
pub fn merkle_root(coinbase: &[u8], branches: &[Hash256]) -> Hash256 {
    let mut root = double_sha256(coinbase);
    for branch in branches {
        let mut combined = [0u8; 64];
        combined[..32].copy_from_slice(root.as_bytes());
        combined[32..].copy_from_slice(branch.as_bytes());
        root = double_sha256(&combined);
    }
    root
}
