/// Narrow key-value seam over persistent storage.
///
/// Cache, statistics and gallery all share one namespace and write through
/// this trait; there is no locking, so concurrent writers are last-writer-wins.
use crate::error::StorageError;
use std::collections::BTreeMap;
use std::fs;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Fails with `StorageError::QuotaExceeded` when the write would not fit.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Bytes currently charged against the quota (keys plus values).
    fn used_bytes(&self) -> usize;
}

fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

fn check_quota(
    quota: Option<usize>,
    used: usize,
    replaced: usize,
    key: &str,
    needed: usize,
) -> Result<(), StorageError> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let available = quota.saturating_sub(used.saturating_sub(replaced));
    if needed > available {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            needed,
            available,
        });
    }
    Ok(())
}

/// In-memory store with an optional byte quota.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota: Option<usize>,
    used: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota: Some(quota_bytes),
            ..Self::default()
        }
    }

    pub fn set_quota(&mut self, quota_bytes: Option<usize>) {
        self.quota = quota_bytes;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let replaced = self
            .entries
            .get(key)
            .map_or(0, |old| entry_size(key, old));
        let needed = entry_size(key, value);
        check_quota(self.quota, self.used, replaced, key, needed)?;

        self.used = self.used - replaced + needed;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if let Some(old) = self.entries.remove(key) {
            self.used -= entry_size(key, &old);
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn used_bytes(&self) -> usize {
        self.used
    }
}

const FILE_SUFFIX: &str = ".kv";

/// Suffix for keys too long to use as a file name. The file is named after
/// the key's SHA-256 and starts with the encoded key on its own line.
const HASHED_SUFFIX: &str = ".kvh";

/// Longest encoded key stored under its own name. Keeps file names well
/// inside the usual 255-byte limit.
const MAX_ENCODED_KEY_LEN: usize = 200;

/// One file per key under a directory, with an optional byte quota.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    quota: Option<usize>,
    used: usize,
}

impl FileStore {
    /// Opens (creating if needed) the store directory and tallies its usage.
    pub fn open(dir: &Path, quota: Option<usize>) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let mut store = Self {
            dir: dir.to_path_buf(),
            quota,
            used: 0,
        };
        store.used = store
            .all_keys()?
            .iter()
            .map(|key| store.stored_size(key))
            .sum();
        log::debug!(
            "Opened file store at {} ({} bytes used)",
            dir.display(),
            store.used
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let encoded = encode_key(key);
        if encoded.len() <= MAX_ENCODED_KEY_LEN {
            self.dir.join(format!("{}{}", encoded, FILE_SUFFIX))
        } else {
            let digest = Sha256::digest(key.as_bytes());
            self.dir
                .join(format!("{}{}", hex::encode(digest), HASHED_SUFFIX))
        }
    }

    /// Bytes written ahead of the value: the encoded-key line of hashed files.
    fn header_len(key: &str) -> usize {
        let encoded = encode_key(key);
        if encoded.len() <= MAX_ENCODED_KEY_LEN {
            0
        } else {
            encoded.len() + 1
        }
    }

    fn all_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let key = if let Some(stem) = name.strip_suffix(FILE_SUFFIX) {
                decode_key(stem)
            } else if name.ends_with(HASHED_SUFFIX) {
                fs::read_to_string(entry.path())?
                    .split_once('\n')
                    .and_then(|(encoded, _)| decode_key(encoded))
            } else {
                None
            };
            keys.extend(key);
        }
        keys.sort();
        Ok(keys)
    }

    fn stored_size(&self, key: &str) -> usize {
        fs::metadata(self.path_for(key)).map_or(0, |m| {
            key.len() + (m.len() as usize).saturating_sub(Self::header_len(key))
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let mut contents = fs::read_to_string(path)?;
        let header = Self::header_len(key);
        if header > 0 {
            contents.drain(..header.min(contents.len()));
        }
        Ok(Some(contents))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let replaced = self.stored_size(key);
        let needed = entry_size(key, value);
        check_quota(self.quota, self.used, replaced, key, needed)?;

        let path = self.path_for(key);
        if Self::header_len(key) > 0 {
            fs::write(path, format!("{}\n{}", encode_key(key), value))?;
        } else {
            fs::write(path, value)?;
        }
        self.used = self.used.saturating_sub(replaced) + needed;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if path.exists() {
            let replaced = self.stored_size(key);
            fs::remove_file(path)?;
            self.used = self.used.saturating_sub(replaced);
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .all_keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    fn used_bytes(&self) -> usize {
        self.used
    }
}

/// Percent-encodes everything outside `[A-Za-z0-9_.-]` so keys map to safe
/// file names.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
