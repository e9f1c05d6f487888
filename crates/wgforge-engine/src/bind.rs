//! Key binder.
//!
//! The only pipeline stage with observable side effects: it asks the key
//! store collaborator for each node's keypair and for the preshared key of
//! every unordered peer pair. The store is opaque; any backend with
//! idempotent get-or-create semantics can stand behind the trait.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use wgforge_wireguard::{KeyPair, PresharedKey};

use crate::error::EngineError;
use crate::model::Network;
use crate::peermap::PeerMap;

/// Errors surfaced by a key store backend.
pub type KeyStoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The key store collaborator contract.
///
/// Both operations must be idempotent and safe under concurrent callers;
/// the engine treats them as opaque.
pub trait KeyStore {
    /// Returns the node's keypair, creating and persisting it if absent.
    ///
    /// # Errors
    ///
    /// Returns the backend's own error on I/O or corruption.
    fn get_or_create(&self, node: &str) -> Result<KeyPair, KeyStoreError>;

    /// Returns the preshared key for an unordered node pair, creating it if
    /// absent. Callers pass the pair in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns the backend's own error on I/O or corruption.
    fn get_or_create_psk(&self, a: &str, b: &str) -> Result<PresharedKey, KeyStoreError>;
}

/// Key material bound to a peer map.
#[derive(Debug, Clone)]
pub struct BoundKeys {
    /// Per-node keypairs, keyed by name.
    pub keys: BTreeMap<String, KeyPair>,
    /// Per-pair preshared keys, keyed by the lexicographically sorted pair.
    pub psks: BTreeMap<(String, String), PresharedKey>,
}

impl BoundKeys {
    /// The PSK for an unordered pair.
    #[must_use]
    pub fn psk(&self, a: &str, b: &str) -> Option<&PresharedKey> {
        self.psks.get(&sorted_pair(a, b))
    }
}

/// The lexicographically sorted form of an unordered pair.
#[must_use]
pub fn sorted_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Fetches keypairs for every node and PSKs for every peer pair.
///
/// # Errors
///
/// Returns a `KeyStore` error for every failed store call.
pub fn bind(
    network: &Network,
    peer_map: &PeerMap,
    store: &dyn KeyStore,
) -> Result<BoundKeys, Vec<EngineError>> {
    let mut errors = Vec::new();
    let mut keys = BTreeMap::new();
    let mut psks = BTreeMap::new();

    for node in network.nodes() {
        match store.get_or_create(&node.name) {
            Ok(pair) => {
                keys.insert(node.name.clone(), pair);
            }
            Err(e) => errors.push(EngineError::KeyStore(format!(
                "keypair for '{}': {e}",
                node.name
            ))),
        }
    }

    let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
    for (node, drafts) in &peer_map.entries {
        for draft in drafts {
            pairs.insert(sorted_pair(node, &draft.peer));
        }
    }

    for (a, b) in pairs {
        match store.get_or_create_psk(&a, &b) {
            Ok(psk) => {
                psks.insert((a, b), psk);
            }
            Err(e) => errors.push(EngineError::KeyStore(format!("psk for '{a}:{b}': {e}"))),
        }
    }

    if errors.is_empty() {
        debug!(keys = keys.len(), psks = psks.len(), "key material bound");
        Ok(BoundKeys { keys, psks })
    } else {
        Err(errors)
    }
}

#[cfg(test)]
pub(crate) mod test_store {
    use std::sync::Mutex;

    use super::*;
    use wgforge_wireguard::PrivateKey;

    /// Deterministic in-memory store for engine tests: keys are derived from
    /// name hashes, so two runs (and two instances) agree byte for byte.
    #[derive(Default)]
    pub struct MemoryKeyStore {
        state: Mutex<MemoryState>,
    }

    #[derive(Default)]
    struct MemoryState {
        keys: BTreeMap<String, KeyPair>,
        psks: BTreeMap<(String, String), PresharedKey>,
        calls: usize,
    }

    impl MemoryKeyStore {
        pub fn call_count(&self) -> usize {
            self.state.lock().expect("lock poisoned").calls
        }
    }

    fn seed_bytes(tag: u8, input: &str) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[0] = tag;
        for (i, b) in input.bytes().enumerate() {
            bytes[1 + (i % 31)] ^= b.wrapping_mul(i as u8 + 1);
        }
        bytes
    }

    impl KeyStore for MemoryKeyStore {
        fn get_or_create(&self, node: &str) -> Result<KeyPair, KeyStoreError> {
            let mut state = self.state.lock().expect("lock poisoned");
            state.calls += 1;
            Ok(state
                .keys
                .entry(node.to_string())
                .or_insert_with(|| {
                    KeyPair::from_private_key(PrivateKey::from_bytes_array(seed_bytes(1, node)))
                })
                .clone())
        }

        fn get_or_create_psk(&self, a: &str, b: &str) -> Result<PresharedKey, KeyStoreError> {
            let mut state = self.state.lock().expect("lock poisoned");
            state.calls += 1;
            let key = (a.to_string(), b.to_string());
            let seed = seed_bytes(2, &format!("{a}:{b}"));
            Ok(state
                .psks
                .entry(key)
                .or_insert_with(|| {
                    PresharedKey::from_bytes(&seed).expect("32-byte seed")
                })
                .clone())
        }
    }
}
