//! Cryptographic primitives for CredVault containers.
//!
//! This module provides:
//! - Passphrase key derivation using Argon2id
//! - Authenticated sealing using XChaCha20-Poly1305 with associated data
//! - Key types with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext, passphrase or key material is ever logged

pub mod aead;
pub mod kdf;
pub mod keys;

pub use aead::{open, seal};
pub use kdf::{derive_key, KdfParams};
pub use keys::{KeyPurpose, MasterKey, Salt, SubKey};
