//! Pktmine Hash - digest primitive and target math
//!
//! This crate provides the hashing building blocks for the pktmine worker:
//! the fixed-width digest type, difficulty-to-target conversion, block
//! header assembly and the pluggable digest engine seam.

pub mod engine;
pub mod hash_types;
pub mod header;
pub mod target;

// Re-export main types
pub use engine::{DigestEngine, DigestError, Sha256dEngine};
pub use hash_types::{double_sha256, Hash256};
pub use header::{merkle_root, WorkHeader, HEADER_LEN};
pub use target::{Difficulty, Target};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
