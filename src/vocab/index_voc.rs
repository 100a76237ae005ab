use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{KeyId, StoreId, WordId};
use crate::vocab::word_voc::WordVoc;

/// Aggregates the per-key `WordVoc`s, assigns globally unique `KeyId`s,
/// and maintains the cross-maps from `spec.md` §4.1: `(StoreId,KeyName)
/// ↔ KeyId`, `StoreId → {KeyId}`, `KeyId → owning WordVoc` (many keys
/// may share one `WordVoc`, e.g. two text keys tokenized the same way).
/// `Serialize`/`Deserialize` back `IndexVoc.dat`, the vocabulary's
/// persisted artifact per `spec.md` §6.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IndexVoc {
    key_name_to_id: HashMap<(StoreId, String), KeyId>,
    key_names: HashMap<KeyId, (StoreId, String)>,
    store_keys: HashMap<StoreId, HashSet<KeyId>>,
    key_to_voc: HashMap<KeyId, usize>,
    word_vocs: Vec<WordVoc>,
    next_key_id: u32,
}

impl IndexVoc {
    pub fn new() -> Self {
        IndexVoc::default()
    }

    /// Registers a new key, allocating a fresh `WordVoc` for it.
    /// Use [`IndexVoc::add_key_sharing`] to back it with an existing
    /// vocabulary instead.
    pub fn add_key(&mut self, store: StoreId, name: &str) -> Result<KeyId> {
        let voc_index = self.word_vocs.len();
        self.word_vocs.push(WordVoc::new());
        self.add_key_with_voc(store, name, voc_index)
    }

    /// Registers a new key that shares its vocabulary with `existing`.
    pub fn add_key_sharing(&mut self, store: StoreId, name: &str, existing: KeyId) -> Result<KeyId> {
        let voc_index = *self
            .key_to_voc
            .get(&existing)
            .ok_or_else(|| Error::new(ErrorKind::UnknownKey, "no such key to share a vocabulary with"))?;
        self.add_key_with_voc(store, name, voc_index)
    }

    fn add_key_with_voc(&mut self, store: StoreId, name: &str, voc_index: usize) -> Result<KeyId> {
        let map_key = (store, name.to_string());
        if self.key_name_to_id.contains_key(&map_key) {
            return Err(Error::new(
                ErrorKind::NameCollision,
                format!("key '{}' already registered on store {}", name, store.0),
            ));
        }

        let key_id = KeyId(self.next_key_id);
        self.next_key_id += 1;

        self.key_name_to_id.insert(map_key.clone(), key_id);
        self.key_names.insert(key_id, map_key);
        self.store_keys.entry(store).or_default().insert(key_id);
        self.key_to_voc.insert(key_id, voc_index);

        Ok(key_id)
    }

    pub fn key_id(&self, store: StoreId, name: &str) -> Result<KeyId> {
        self.key_name_to_id
            .get(&(store, name.to_string()))
            .copied()
            .ok_or_else(|| Error::new(ErrorKind::UnknownKey, format!("unknown key '{}'", name)))
    }

    pub fn key_name(&self, key: KeyId) -> Option<&str> {
        self.key_names.get(&key).map(|(_, n)| n.as_str())
    }

    pub fn store_keys(&self, store: StoreId) -> Vec<KeyId> {
        self.store_keys
            .get(&store)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn word_voc(&self, key: KeyId) -> Result<&WordVoc> {
        let idx = *self
            .key_to_voc
            .get(&key)
            .ok_or_else(|| Error::new(ErrorKind::UnknownKey, "unknown key"))?;
        Ok(&self.word_vocs[idx])
    }

    pub fn word_voc_mut(&mut self, key: KeyId) -> Result<&mut WordVoc> {
        let idx = *self
            .key_to_voc
            .get(&key)
            .ok_or_else(|| Error::new(ErrorKind::UnknownKey, "unknown key"))?;
        Ok(&mut self.word_vocs[idx])
    }

    /// Intern `word` under `key`, returning its (possibly new) id.
    pub fn add_word(&mut self, key: KeyId, word: &str) -> Result<WordId> {
        Ok(self.word_voc_mut(key)?.add(word))
    }

    /// Lookup `word` under `key`. Unknown words are not an error: an
    /// empty result means the leaf matches nothing (§4.1).
    pub fn lookup_word(&self, key: KeyId, word: &str) -> Result<Option<WordId>> {
        Ok(self.word_voc(key)?.lookup_exact(word))
    }
}
