// src/cache/hash.rs

//! Content hashing helpers built on the keyed cache.
//!
//! [`hash_file`] produces the same SHA-256 hex digest as `sha256sum`, so a
//! local file can be compared against a remote copy. [`fingerprint_paths`]
//! folds many files into one blake3 digest used to decide whether a shell
//! task's inputs changed.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::cache::Cache;

/// Directory names never descended into while collecting sources.
const SKIPPED_DIRS: &[&str] = &[".git", ".mk"];

/// SHA-256 of a file's contents as lowercase hex.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Identity of one version of a file: path, size and modification time.
///
/// Used as the key of the persistent file-hash cache, so an edited file gets
/// a new stamp and is re-hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStamp {
    pub path: PathBuf,
    pub len: u64,
    pub modified_secs: u64,
    pub modified_nanos: u32,
}

impl FileStamp {
    pub fn of(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).with_context(|| format!("stat {:?}", path))?;
        let modified = meta
            .modified()
            .with_context(|| format!("mtime of {:?}", path))?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            len: meta.len(),
            modified_secs: modified.as_secs(),
            modified_nanos: modified.subsec_nanos(),
        })
    }
}

/// [`hash_file`] memoized in `cache` by the file's current [`FileStamp`].
pub fn hash_file_cached(cache: &mut Cache<FileStamp, String>, path: &Path) -> Result<String> {
    let stamp = FileStamp::of(path)?;
    cache.try_get_or_eval(stamp, |_| {
        debug!("cache miss: computing hash for {:?}", path);
        hash_file(path)
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("invalid source pattern {:?}", pattern))?;
        builder.add(glob);
    }
    builder.build().context("building source pattern set")
}

/// Every regular file under `root` whose root-relative path matches one of
/// `patterns`. Paths are returned absolute-from-`root` and sorted.
pub fn collect_sources(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let set = build_globset(patterns)?;
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).with_context(|| format!("reading directory {:?}", dir))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("reading directory {:?}", dir))?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                let skipped = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name));
                if !skipped {
                    pending.push(path);
                }
                continue;
            }

            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            if file_type.is_file() && set.is_match(rel) {
                trace!(path = %rel.display(), "source matched");
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Aggregate blake3 digest over the contents of `paths`.
///
/// Order of `paths` does not matter; they are sorted first. Each file
/// contributes its path relative to `root` and its content hash, so renaming
/// a file changes the fingerprint but moving the whole tree does not. Paths
/// outside `root` are hashed as given.
pub fn fingerprint_paths<I, P>(root: &Path, paths: I) -> Result<String>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut paths: Vec<PathBuf> = paths
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .collect();
    paths.sort();

    let mut hasher = blake3::Hasher::new();
    for path in paths {
        if !path.is_file() {
            continue;
        }
        let mut file = File::open(&path).with_context(|| format!("opening file for hashing: {:?}", path))?;
        let mut content = blake3::Hasher::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            content.update(&buf[..n]);
        }
        let label = path.strip_prefix(root).unwrap_or(&path);
        hasher.update(label.to_string_lossy().as_bytes());
        hasher.update(content.finalize().as_bytes());
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(hash = %hash, "computed source fingerprint");
    Ok(hash)
}
