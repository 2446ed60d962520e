//! The pluggable digest primitive
//!
//! The search loop treats "compute the candidate digest for a header and
//! nonce" as an injected dependency behind `DigestEngine`, so a production
//! PacketCrypt implementation can replace the default double-SHA-256 engine
//! without touching the protocol state machine or the scheduler.

use crate::hash_types::{double_sha256, Hash256};
use crate::header::HEADER_LEN;
use thiserror::Error;

/// Digest computation error types
#[derive(Error, Debug)]
pub enum DigestError {
    #[error("digest computation failed: {0}")]
    Computation(String),
}

/// A candidate digest function over the serialized header.
pub trait DigestEngine: Send + Sync {
    /// Engine name for logs and stats
    fn name(&self) -> &'static str;

    /// Compute the candidate digest for one serialized header.
    fn digest(&self, header: &[u8; HEADER_LEN]) -> Result<Hash256, DigestError>;
}

/// Default engine: double SHA-256 over the 80-byte header.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256dEngine;

impl DigestEngine for Sha256dEngine {
    fn name(&self) -> &'static str {
        "sha256d"
    }

    fn digest(&self, header: &[u8; HEADER_LEN]) -> Result<Hash256, DigestError> {
        Ok(double_sha256(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256d_engine_matches_helper() {
        let header = [7u8; HEADER_LEN];
        let engine = Sha256dEngine;
        assert_eq!(engine.digest(&header).unwrap(), double_sha256(&header));
        assert_eq!(engine.name(), "sha256d");
    }

    #[test]
    fn test_engine_is_deterministic() {
        let header = [42u8; HEADER_LEN];
        let engine = Sha256dEngine;
        assert_eq!(
            engine.digest(&header).unwrap(),
            engine.digest(&header).unwrap()
        );
    }
}
