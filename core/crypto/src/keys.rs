//! Master key, per-purpose sub-keys and the KDF salt.
//!
//! Key material is wiped when the owning value is dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key size in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of the KDF salt in bytes.
pub const SALT_LENGTH: usize = 32;

/// What a sub-key is used for. Each purpose yields an independent key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// Seals the constant used to check the passphrase on open.
    Verification,
    /// Seals the serialized vault tree.
    Payload,
}

impl KeyPurpose {
    fn label(&self) -> &'static [u8] {
        match self {
            KeyPurpose::Verification => b"credvault.verify.v1",
            KeyPurpose::Payload => b"credvault.payload.v1",
        }
    }
}

/// Master key derived from the container passphrase.
///
/// Never used to seal data directly; see [`MasterKey::derive_subkey`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Raw key bytes. Do not copy them anywhere that outlives the key.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Derive the sub-key for `purpose` using keyed BLAKE2b.
    pub fn derive_subkey(&self, purpose: KeyPurpose) -> SubKey {
        use blake2::digest::consts::U32;
        use blake2::{Blake2b, Digest};

        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.key);
        hasher.update(purpose.label());

        let mut subkey = [0u8; KEY_LENGTH];
        subkey.copy_from_slice(&hasher.finalize());
        SubKey::from_bytes(subkey)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Key derived from the master key for a single [`KeyPurpose`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SubKey {
    key: [u8; KEY_LENGTH],
}

impl SubKey {
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for SubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubKey([REDACTED])")
    }
}

/// Salt for key derivation. Stored in clear in the container header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(pub [u8; SALT_LENGTH]);

impl Salt {
    /// Fresh salt from the thread-local CSPRNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}
