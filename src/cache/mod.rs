// src/cache/mod.rs

//! Persistent keyed cache.
//!
//! A [`Cache`] is an in-memory map that is loaded from and saved to a JSON
//! file as a list of `{"key": .., "value": ..}` records. Storing records
//! instead of a JSON object lets composite keys (structs, tuples) survive the
//! round trip.
//!
//! The cache is advisory. [`load`] never fails: a missing file is an empty
//! cache, and an unreadable or corrupt one is logged and treated as empty.
//! [`save`] logs and swallows write failures.

pub mod hash;

use std::collections::HashMap;
use std::fs::{self, File};
use std::hash::Hash;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use hash::{collect_sources, fingerprint_paths, hash_file, hash_file_cached, FileStamp};

/// In-memory key/value memoization store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache<K, V>
where
    K: Eq + Hash,
{
    entries: HashMap<K, V>,
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    /// Drop entries whose key does not satisfy `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.entries.retain(|k, _| keep(k));
    }

    /// Return the value stored under `key`, evaluating and storing it first if
    /// it is missing.
    ///
    /// `eval` gets the cache itself so recursive computations can memoize
    /// their sub-results in the same store.
    pub fn get_or_eval<F>(&mut self, key: K, eval: F) -> V
    where
        V: Clone,
        F: FnOnce(&mut Self) -> V,
    {
        if let Some(value) = self.entries.get(&key) {
            return value.clone();
        }

        let value = crate::on_growable_stack(|| eval(self));
        self.entries.entry(key).or_insert(value).clone()
    }

    /// Fallible variant of [`Cache::get_or_eval`]; nothing is stored when
    /// `eval` fails.
    pub fn try_get_or_eval<F, E>(&mut self, key: K, eval: F) -> Result<V, E>
    where
        V: Clone,
        F: FnOnce(&mut Self) -> Result<V, E>,
    {
        if let Some(value) = self.entries.get(&key) {
            return Ok(value.clone());
        }

        let value = crate::on_growable_stack(|| eval(self))?;
        Ok(self.entries.entry(key).or_insert(value).clone())
    }

    /// Store `value` under `key`, returning `true` if the stored value changed.
    pub fn compare_and_swap(&mut self, key: K, value: V) -> bool
    where
        V: PartialEq,
    {
        match self.entries.get(&key) {
            Some(old) if *old == value => false,
            _ => {
                self.entries.insert(key, value);
                true
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Cache<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Record<K, V> {
    key: K,
    value: V,
}

/// Load a cache from `path`. Never fails; see the module docs.
pub fn load<K, V>(path: impl AsRef<Path>) -> Cache<K, V>
where
    K: Eq + Hash + DeserializeOwned,
    V: DeserializeOwned,
{
    let path = path.as_ref();

    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no cache file; starting empty");
            return Cache::new();
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "can't open cache file; starting empty");
            return Cache::new();
        }
    };

    let cache = load_from_reader(BufReader::new(file));
    debug!(path = %path.display(), entries = cache.len(), "loaded cache");
    cache
}

/// Load a cache from an arbitrary reader. Invalid input yields an empty cache.
pub fn load_from_reader<K, V, R>(reader: R) -> Cache<K, V>
where
    K: Eq + Hash + DeserializeOwned,
    V: DeserializeOwned,
    R: Read,
{
    match serde_json::from_reader::<_, Vec<Record<K, V>>>(reader) {
        Ok(records) => records.into_iter().map(|r| (r.key, r.value)).collect(),
        Err(err) => {
            warn!(error = %err, "invalid cache file, run `mk prune` to reset it; starting empty");
            Cache::new()
        }
    }
}

/// Save `cache` to `path`, replacing the file. Failures are logged only.
pub fn save<K, V>(path: impl AsRef<Path>, cache: &Cache<K, V>)
where
    K: Eq + Hash + Serialize,
    V: Serialize,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(dir = %parent.display(), error = %err, "can't create cache directory");
                return;
            }
        }
    }

    let file = match File::create(path) {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "can't open cache file for writing");
            return;
        }
    };

    let mut writer = BufWriter::new(file);
    if let Err(err) = save_to_writer(&mut writer, cache).and_then(|_| writer.flush()) {
        warn!(path = %path.display(), error = %err, "save cache failed");
        return;
    }

    debug!(path = %path.display(), entries = cache.len(), "saved cache");
}

/// Serialize `cache` as a record list into `writer`.
pub fn save_to_writer<K, V, W>(writer: W, cache: &Cache<K, V>) -> std::io::Result<()>
where
    K: Eq + Hash + Serialize,
    V: Serialize,
    W: Write,
{
    let records: Vec<Record<&K, &V>> = cache
        .iter()
        .map(|(key, value)| Record { key, value })
        .collect();
    serde_json::to_writer(writer, &records).map_err(std::io::Error::from)
}

/// Load the cache at `path`, run `body` with it, and save it back if `body`
/// succeeded. On error nothing is written so partial results never persist.
pub fn with_cache<K, V, T, E, F>(path: impl AsRef<Path>, body: F) -> Result<T, E>
where
    K: Eq + Hash + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
    F: FnOnce(&mut Cache<K, V>) -> Result<T, E>,
{
    let path = path.as_ref();
    let mut cache = load(path);
    let result = body(&mut cache)?;
    save(path, &cache);
    Ok(result)
}
