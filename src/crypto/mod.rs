//! Cryptographic utilities for the wallet
//!
//! This module provides:
//! - SHA-256 hashing
//! - Call selector derivation

pub mod hash;

pub use hash::{selector, sha256, SELECTOR_LEN};
