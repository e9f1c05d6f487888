//! File-backed key store.
//!
//! A single JSON object holds every node keypair and every pairwise
//! preshared key. Mutations take an adjacent `.lock` file, write to a
//! temporary file, and rename into place, so concurrent generators converge
//! on the same key material and a crash never leaves a half-written store.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wgforge_engine::bind::{KeyStore, KeyStoreError};
use wgforge_wireguard::{KeyPair, PresharedKey, PrivateKey, PublicKey};

use crate::error::{Result, StoreError};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const LOCK_ATTEMPTS: u32 = 100;

/// A stored node keypair.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredKeyPair {
    private_key: String,
    public_key: String,
    created_at: DateTime<Utc>,
}

/// A stored pairwise preshared key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPsk {
    psk: String,
    created_at: DateTime<Utc>,
}

/// The on-disk layout: `{"keys": {...}, "psks": {...}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    keys: BTreeMap<String, StoredKeyPair>,
    #[serde(default)]
    psks: BTreeMap<String, StoredPsk>,
}

/// Public listing entry for stored keys.
#[derive(Debug, Clone, Serialize)]
pub struct KeyInfo {
    /// The node the keypair belongs to.
    pub node_name: String,
    /// Base64 public key.
    pub public_key: String,
    /// When the pair was created.
    pub created_at: DateTime<Utc>,
}

/// JSON key store keyed by node name, guarded by an adjacent `.lock` file.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Opens (or will lazily create) the store at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn load(&self) -> Result<StoreData> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreData::default()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&self, data: &StoreData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let json = serde_json::to_string_pretty(data).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        // Write-then-rename keeps readers from ever seeing a torn file.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Runs `mutate` with the lock held, persisting its result.
    fn with_lock<T>(&self, mutate: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        let _guard = LockGuard::acquire(self.lock_path())?;
        let mut data = self.load()?;
        let result = mutate(&mut data)?;
        self.save(&data)?;
        Ok(result)
    }

    /// Returns the stored keypair for a node, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or corrupt stored material.
    pub fn keypair(&self, node: &str) -> Result<Option<KeyPair>> {
        let data = self.load()?;
        data.keys.get(node).map(|s| decode_pair(node, s)).transpose()
    }

    /// Lists all stored keys (public material only).
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn list(&self) -> Result<Vec<KeyInfo>> {
        let data = self.load()?;
        Ok(data
            .keys
            .iter()
            .map(|(name, stored)| KeyInfo {
                node_name: name.clone(),
                public_key: stored.public_key.clone(),
                created_at: stored.created_at,
            })
            .collect())
    }

    /// Removes a node's keypair and every PSK involving it.
    ///
    /// Returns whether a keypair was actually removed.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or lock failure.
    pub fn remove(&self, node: &str) -> Result<bool> {
        self.with_lock(|data| {
            let removed = data.keys.remove(node).is_some();
            data.psks.retain(|pair, _| {
                pair.split(':').all(|side| side != node)
            });
            if removed {
                info!(node, "removed keypair");
            } else {
                warn!(node, "no keypair to remove");
            }
            Ok(removed)
        })
    }
}

fn decode_pair(name: &str, stored: &StoredKeyPair) -> Result<KeyPair> {
    let private =
        PrivateKey::from_base64(&stored.private_key).map_err(|source| StoreError::InvalidKey {
            name: name.to_string(),
            source,
        })?;
    let public =
        PublicKey::from_base64(&stored.public_key).map_err(|source| StoreError::InvalidKey {
            name: name.to_string(),
            source,
        })?;
    let pair = KeyPair::from_private_key(private);
    if pair.public_key() != &public {
        warn!(node = name, "stored public key does not match private key");
    }
    Ok(pair)
}

fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

impl KeyStore for FileKeyStore {
    fn get_or_create(&self, node: &str) -> std::result::Result<KeyPair, KeyStoreError> {
        // Fast path without the lock; the common case is a populated store.
        if let Some(pair) = self.keypair(node)? {
            debug!(node, "using existing keypair");
            return Ok(pair);
        }

        let pair = self.with_lock(|data| {
            if let Some(stored) = data.keys.get(node) {
                return decode_pair(node, stored);
            }
            let pair = KeyPair::generate();
            data.keys.insert(
                node.to_string(),
                StoredKeyPair {
                    private_key: pair.private_key().to_base64(),
                    public_key: pair.public_key().to_base64(),
                    created_at: Utc::now(),
                },
            );
            info!(node, "generated keypair");
            Ok(pair)
        })?;
        Ok(pair)
    }

    fn get_or_create_psk(
        &self,
        a: &str,
        b: &str,
    ) -> std::result::Result<PresharedKey, KeyStoreError> {
        let key = pair_key(a, b);

        let data = self.load()?;
        if let Some(stored) = data.psks.get(&key) {
            let psk =
                PresharedKey::from_base64(&stored.psk).map_err(|source| StoreError::InvalidKey {
                    name: key.clone(),
                    source,
                })?;
            return Ok(psk);
        }

        let psk = self.with_lock(|data| {
            if let Some(stored) = data.psks.get(&key) {
                return PresharedKey::from_base64(&stored.psk).map_err(|source| {
                    StoreError::InvalidKey {
                        name: key.clone(),
                        source,
                    }
                });
            }
            let psk = PresharedKey::generate();
            data.psks.insert(
                key.clone(),
                StoredPsk {
                    psk: psk.to_base64(),
                    created_at: Utc::now(),
                },
            );
            info!(pair = %key, "generated preshared key");
            Ok(psk)
        })?;
        Ok(psk)
    }
}

/// Holds the `.lock` sentinel file; removed on drop.
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(path: PathBuf) -> Result<Self> {
        for _ in 0..LOCK_ATTEMPTS {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(source) => {
                    return Err(StoreError::Io {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }
        Err(StoreError::LockTimeout(path))
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}
