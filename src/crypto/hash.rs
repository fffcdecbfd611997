//! Hashing utilities for the wallet
//!
//! Provides the SHA-256 helpers used to derive wallet addresses and
//! administrative call selectors.

use sha2::{Digest, Sha256};

/// Length in bytes of a call selector
pub const SELECTOR_LEN: usize = 4;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes the 4-byte selector of a canonical call signature,
/// e.g. `addOwner(address)`
pub fn selector(signature: &str) -> [u8; SELECTOR_LEN] {
    let hash = sha256(signature.as_bytes());
    let mut out = [0u8; SELECTOR_LEN];
    out.copy_from_slice(&hash[..SELECTOR_LEN]);
    out
}
