//! Vault codec: opening, creating and saving encrypted containers.
//!
//! The engine only talks to [`VaultCodec`]. [`FileCodec`] stores a container
//! as one JSON document on the local filesystem:
//!
//! ```text
//! { "header": { version, salt, kdf_params, key_verification, ... },
//!   "payload": base64(nonce || XChaCha20-Poly1305(tree JSON, aad = header binding)) }
//! ```

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{base64_bytes, ContainerHeader};
use crate::tree::Vault;
use credvault_common::{Error, Result, Secret};
use credvault_crypto::{open, seal, KdfParams, KeyPurpose, MasterKey};

/// An unlocked container: the tree plus what is needed to seal it again.
///
/// Holds the master key for the lifetime of a request; the key is zeroized
/// when the container is dropped.
pub struct Container {
    path: PathBuf,
    header: ContainerHeader,
    key: MasterKey,
    vault: Vault,
}

impl Container {
    pub fn new(path: PathBuf, header: ContainerHeader, key: MasterKey, vault: Vault) -> Self {
        Self {
            path,
            header,
            key,
            vault,
        }
    }

    /// Location the container is saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn vault_mut(&mut self) -> &mut Vault {
        &mut self.vault
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("groups", &self.vault.group_count())
            .field("entries", &self.vault.entry_count())
            .finish()
    }
}

/// Storage collaborator for encrypted containers.
pub trait VaultCodec {
    /// Check whether something exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Open and decrypt an existing container.
    ///
    /// # Errors
    /// - `Open` if the container is missing, the passphrase is wrong, or
    ///   the content is corrupt
    fn open(&self, path: &Path, passphrase: &Secret) -> Result<Container>;

    /// Build a new, empty container in memory. Nothing is written until
    /// [`VaultCodec::save`].
    fn create(&self, path: &Path, passphrase: &Secret) -> Result<Container>;

    /// Seal and write the container back to its path.
    ///
    /// # Errors
    /// - `Io` if the container cannot be written
    fn save(&self, container: &mut Container) -> Result<()>;
}

/// On-disk document.
#[derive(Serialize, Deserialize)]
struct ContainerFile {
    header: ContainerHeader,
    #[serde(with = "base64_bytes")]
    payload: Vec<u8>,
}

/// Filesystem-backed codec.
#[derive(Debug, Clone, Default)]
pub struct FileCodec {
    kdf_params: KdfParams,
}

impl FileCodec {
    /// Codec creating containers with interactive KDF parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec creating containers with the given KDF parameters. Existing
    /// containers always open with the parameters stored in their header.
    pub fn with_kdf_params(kdf_params: KdfParams) -> Self {
        Self { kdf_params }
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl VaultCodec for FileCodec {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn open(&self, path: &Path, passphrase: &Secret) -> Result<Container> {
        debug!(path = %path.display(), "Opening container");

        if !path.exists() {
            return Err(Error::Open(format!("Container not found: {}", path.display())));
        }
        let bytes = fs::read(path)
            .map_err(|e| Error::Open(format!("Cannot read {}: {}", path.display(), e)))?;
        let file: ContainerFile = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Open(format!("Corrupt container header: {}", e)))?;

        let key = file.header.unlock(passphrase)?;
        let payload_key = key.derive_subkey(KeyPurpose::Payload);
        let plaintext = open(&payload_key, &file.payload, &file.header.binding())
            .map_err(|_| Error::Open("Container payload failed authentication".to_string()))?;
        let vault: Vault = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::Open(format!("Corrupt container payload: {}", e)))?;

        info!(
            path = %path.display(),
            groups = vault.group_count(),
            entries = vault.entry_count(),
            "Container opened"
        );
        Ok(Container::new(path.to_path_buf(), file.header, key, vault))
    }

    fn create(&self, path: &Path, passphrase: &Secret) -> Result<Container> {
        debug!(path = %path.display(), "Creating container");

        let (header, key) = ContainerHeader::new(passphrase, self.kdf_params.clone())?;
        Ok(Container::new(path.to_path_buf(), header, key, Vault::new()))
    }

    fn save(&self, container: &mut Container) -> Result<()> {
        container.header.modified_at = chrono::Utc::now();

        let tree = serde_json::to_vec(&container.vault)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let payload_key = container.key.derive_subkey(KeyPurpose::Payload);
        let payload = seal(&payload_key, &tree, &container.header.binding())?;

        let file = ContainerFile {
            header: container.header.clone(),
            payload,
        };
        let bytes =
            serde_json::to_vec_pretty(&file).map_err(|e| Error::Serialization(e.to_string()))?;

        // Write beside the target and rename over it so a failed save
        // never leaves a truncated container behind.
        let temp = Self::temp_path(&container.path);
        fs::write(&temp, &bytes)?;
        if let Err(e) = fs::rename(&temp, &container.path) {
            let _ = fs::remove_file(&temp);
            return Err(Error::Io(e));
        }

        info!(path = %container.path.display(), size = bytes.len(), "Container saved");
        Ok(())
    }
}
