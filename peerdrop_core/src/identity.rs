use base64::{Engine, engine::general_purpose};
use iroh::SecretKey;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::NodeId;
use crate::error::IdentityError;

/// Key under which the encoded secret key is stored
pub const SECRET_KEY_ENTRY: &str = "node_secret_key";

/// Long-lived node identity. The node id is derived from the secret key.
#[derive(Clone)]
pub struct Identity {
    secret_key: SecretKey,
}

impl Identity {
    pub fn generate() -> Self {
        Self {
            secret_key: SecretKey::generate(&mut rand::rng()),
        }
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        Self { secret_key }
    }

    pub fn node_id(&self) -> NodeId {
        self.secret_key.public()
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Storage-safe textual form of the secret key (standard base64 of 32 bytes)
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.secret_key.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, IdentityError> {
        let raw = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(IdentityError::Encoding)?;
        let len = raw.len();
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(len))?;
        Ok(Self::from_secret_key(SecretKey::from_bytes(&bytes)))
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("node_id", &self.node_id())
            .finish_non_exhaustive()
    }
}

/// Minimal string key/value persistence the identity store sits on.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> std::io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;
}

/// One file per key inside a directory. Files are created with 0o600 on unix.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;

        // The mode above only applies to new files.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(value.as_bytes())?;
        Ok(())
    }
}

/// Volatile store, used by tests and throwaway nodes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Loads and saves the node [`Identity`] so the node id survives restarts.
pub struct IdentityStore<S> {
    store: S,
}

impl<S: KeyValueStore> IdentityStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Previously saved identity, or `None`.
    ///
    /// Unreadable or corrupt entries are logged and reported as absent.
    pub fn load(&self) -> Option<Identity> {
        match self.try_load() {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Ignoring stored identity: {}", e);
                None
            }
        }
    }

    fn try_load(&self) -> Result<Option<Identity>, IdentityError> {
        let Some(encoded) = self
            .store
            .get(SECRET_KEY_ENTRY)
            .map_err(IdentityError::Storage)?
        else {
            return Ok(None);
        };
        Identity::from_base64(&encoded).map(Some)
    }

    pub fn save(&self, identity: &Identity) -> Result<(), IdentityError> {
        self.store
            .set(SECRET_KEY_ENTRY, &identity.to_base64())
            .map_err(IdentityError::Storage)
    }

    /// Reuse the stored identity or create and persist a new one.
    ///
    /// Returns the identity and whether it was freshly generated. A failed save
    /// is logged; the fresh identity is still returned.
    pub fn load_or_generate(&self) -> (Identity, bool) {
        if let Some(identity) = self.load() {
            info!("Loaded existing identity: {}", identity.node_id());
            return (identity, false);
        }

        let identity = Identity::generate();
        info!("Generated new identity: {}", identity.node_id());
        if let Err(e) = self.save(&identity) {
            warn!("Could not persist new identity: {}", e);
        }
        (identity, true)
    }
}
