//! Container header: format version and key-derivation settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use credvault_common::{Error, Result, Secret};
use credvault_crypto::{derive_key, open, seal, KdfParams, KeyPurpose, MasterKey, Salt};

/// Plaintext sealed under the verification key to check a passphrase.
const VERIFICATION_PLAINTEXT: &[u8] = b"CREDVAULT_KEY_VERIFICATION_V1";

/// Container format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultVersion {
    pub major: u32,
    pub minor: u32,
}

impl VaultVersion {
    /// Current container format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version can be read by this build.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for VaultVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Clear-text header stored in front of the sealed tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHeader {
    /// Container format version.
    pub version: VaultVersion,
    /// Salt for master key derivation.
    pub salt: Salt,
    /// KDF parameters.
    pub kdf_params: KdfParams,
    /// Verification constant sealed under the derived key.
    #[serde(with = "base64_bytes")]
    pub key_verification: Vec<u8>,
    /// Container creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last save timestamp.
    pub modified_at: DateTime<Utc>,
}

impl ContainerHeader {
    /// Create a header for a new container and return it with the master key.
    ///
    /// # Errors
    /// - Passphrase empty
    /// - KDF failure
    pub fn new(passphrase: &Secret, kdf_params: KdfParams) -> Result<(Self, MasterKey)> {
        let salt = Salt::generate();
        let master_key = derive_key(passphrase.as_bytes(), &salt, &kdf_params)?;

        let verify_key = master_key.derive_subkey(KeyPurpose::Verification);
        let key_verification = seal(&verify_key, VERIFICATION_PLAINTEXT, &[])?;

        let now = Utc::now();
        let header = Self {
            version: VaultVersion::CURRENT,
            salt,
            kdf_params,
            key_verification,
            created_at: now,
            modified_at: now,
        };
        Ok((header, master_key))
    }

    /// Derive the master key for `passphrase` and check it against this header.
    ///
    /// # Errors
    /// - `Open` if the format version is incompatible or the passphrase is wrong
    pub fn unlock(&self, passphrase: &Secret) -> Result<MasterKey> {
        if !self.version.is_compatible() {
            return Err(Error::Open(format!(
                "Incompatible container version {}.{}",
                self.version.major, self.version.minor
            )));
        }

        let master_key = derive_key(passphrase.as_bytes(), &self.salt, &self.kdf_params)?;
        let verify_key = master_key.derive_subkey(KeyPurpose::Verification);

        let plaintext = open(&verify_key, &self.key_verification, &[])
            .map_err(|_| Error::Open("Invalid passphrase".to_string()))?;
        if !bool::from(plaintext.as_slice().ct_eq(VERIFICATION_PLAINTEXT)) {
            return Err(Error::Open("Invalid passphrase".to_string()));
        }

        Ok(master_key)
    }

    /// Bytes bound as associated data to the sealed payload.
    ///
    /// Covers every field that determines how the payload is keyed, so a
    /// header swapped between containers fails authentication.
    pub fn binding(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.key_verification.len());
        out.extend_from_slice(&self.version.major.to_le_bytes());
        out.extend_from_slice(&self.version.minor.to_le_bytes());
        out.extend_from_slice(self.salt.as_bytes());
        out.extend_from_slice(&self.kdf_params.memory_cost.to_le_bytes());
        out.extend_from_slice(&self.kdf_params.time_cost.to_le_bytes());
        out.extend_from_slice(&self.kdf_params.parallelism.to_le_bytes());
        out.extend_from_slice(&self.key_verification);
        out
    }
}

/// Serde adapter storing byte vectors as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
