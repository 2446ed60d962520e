/// Common hash types shared by the digest engine and the protocol client

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 256-bit digest (32 bytes)
///
/// The bytes are interpreted as a big-endian unsigned integer everywhere in
/// this workspace: byte 0 is the most significant. Lexicographic comparison
/// of the byte arrays therefore equals numeric comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from slice (must be 32 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self, &'static str> {
        if slice.len() != 32 {
            return Err("Hash256 requires exactly 32 bytes");
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        Self::from_slice(&bytes).map_err(|_| hex::FromHexError::InvalidStringLength)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash256 {
    fn default() -> Self {
        Self([0u8; 32])
    }
}

/// Double SHA-256, the classic pool-share digest
pub fn double_sha256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash256::from_bytes(second.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash256_basics() {
        let hash = Hash256::from_bytes([1u8; 32]);
        assert_eq!(hash.as_bytes(), &[1u8; 32]);

        let hex = hash.to_hex();
        let hash2 = Hash256::from_hex(&hex).unwrap();
        assert_eq!(hash, hash2);
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(Hash256::from_slice(&[0u8; 31]).is_err());
        assert!(Hash256::from_slice(&[0u8; 33]).is_err());
        assert!(Hash256::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_big_endian_ordering() {
        // Byte 0 is most significant: 0x01 00 .. 00 > 0x00 ff .. ff
        let mut a = [0u8; 32];
        a[0] = 0x01;
        let mut b = [0xffu8; 32];
        b[0] = 0x00;
        assert!(Hash256::from_bytes(a) > Hash256::from_bytes(b));
    }

    #[test]
    fn test_double_sha256_known_vector() {
        // sha256d of the empty input
        let digest = double_sha256(b"");
        assert_eq!(
            digest.to_hex(),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }
}
