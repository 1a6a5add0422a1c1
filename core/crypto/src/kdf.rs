//! Passphrase to master key, via Argon2id.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::keys::{MasterKey, Salt, KEY_LENGTH};
use credvault_common::{Error, Result};

/// Argon2id cost settings.
///
/// Stored in the container header so a container always reopens with the
/// parameters it was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// KiB of memory.
    pub memory_cost: u32,
    /// Passes over memory.
    pub time_cost: u32,
    /// Lanes.
    pub parallelism: u32,
}

impl KdfParams {
    /// Default for new containers; well under a second on a desktop.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 64 * 1024,
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Slow; for containers that are rarely opened.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 256 * 1024,
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// Moderate parameters for constrained hosts.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32 * 1024,
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Smallest parameters Argon2 accepts. Only for tests and throwaway containers.
    pub fn minimal() -> Self {
        Self {
            memory_cost: 8,
            time_cost: 1,
            parallelism: 1,
        }
    }

    /// Resolve a preset by name.
    pub fn from_preset(name: &str) -> Result<Self> {
        match name {
            "interactive" => Ok(Self::interactive()),
            "moderate" => Ok(Self::moderate()),
            "sensitive" => Ok(Self::sensitive()),
            "minimal" => Ok(Self::minimal()),
            other => Err(Error::Validation(format!(
                "Unknown KDF strength '{}': use interactive, moderate, sensitive or minimal",
                other
            ))),
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive a master key from a passphrase and salt using Argon2id.
///
/// # Preconditions
/// - `passphrase` must not be empty
///
/// # Errors
/// - Returns a validation error if the passphrase is empty
/// - Returns a crypto error if the Argon2id parameters are invalid
pub fn derive_key(passphrase: &[u8], salt: &Salt, params: &KdfParams) -> Result<MasterKey> {
    if passphrase.is_empty() {
        return Err(Error::Validation("Passphrase cannot be empty".to_string()));
    }

    let cost = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| Error::Crypto(format!("Rejected Argon2id parameters: {}", e)))?;

    let mut output = [0u8; KEY_LENGTH];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, cost)
        .hash_password_into(passphrase, salt.as_bytes(), &mut output)
        .map_err(|e| Error::Crypto(format!("Argon2id failed: {}", e)))?;

    let key = MasterKey::from_bytes(output);
    output.zeroize();
    Ok(key)
}
