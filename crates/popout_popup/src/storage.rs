//! Persistent key-value storage backing size memory.
//!
//! `FileStorage` keeps one JSON document per profile with atomic writes and
//! backup rotation; `MemoryStorage` is the volatile counterpart.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{StorageError, StorageResult};

pub const SCHEMA_VERSION: u32 = 1;

/// The `get(keys)` / `set(map)` capability consumed from the host.
pub trait KeyValueStorage: Send + Sync + 'static {
    /// Returns the stored value for each present key; absent keys are
    /// omitted from the map.
    fn get(
        &self,
        keys: &[String],
    ) -> impl Future<Output = StorageResult<HashMap<String, Value>>> + Send;

    fn set(&self, entries: HashMap<String, Value>)
    -> impl Future<Output = StorageResult<()>> + Send;
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
    fail_writes: Mutex<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every subsequent `set` fail, for exercising error paths.
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

impl KeyValueStorage for MemoryStorage {
    async fn get(&self, keys: &[String]) -> StorageResult<HashMap<String, Value>> {
        let entries = self.entries.lock();
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> StorageResult<()> {
        if *self.fail_writes.lock() {
            return Err(StorageError::Write("writes disabled".to_string()));
        }
        self.entries.lock().extend(entries);
        Ok(())
    }
}

/// On-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageDocument {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    #[serde(default)]
    entries: BTreeMap<String, Value>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Default for StorageDocument {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            entries: BTreeMap::new(),
        }
    }
}

/// JSON file storage at `<root>/profiles/<profile>/storage.json`.
///
/// The document is loaded lazily and cached; writes go through the cache
/// and are flushed immediately.
pub struct FileStorage {
    path: PathBuf,
    cache: tokio::sync::Mutex<Option<StorageDocument>>,
}

impl FileStorage {
    pub fn new(profile_dir: PathBuf) -> Self {
        Self {
            path: profile_dir.join("storage.json"),
            cache: tokio::sync::Mutex::new(None),
        }
    }

    /// Storage for `profile` under the popout data directory.
    pub fn open_profile(profile: &str) -> StorageResult<Self> {
        let dir = popout_shared::paths::get_profile_dir(profile)
            .map_err(|e| StorageError::Read(e.to_string()))?;
        Ok(Self::new(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StorageResult<StorageDocument> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(StorageDocument::default());
        }
        let data = fs::read_to_string(&self.path)
            .await
            .map_err(|e| StorageError::Read(format!("{}: {}", self.path.display(), e)))?;
        match serde_json::from_str::<StorageDocument>(&data) {
            Ok(document) => Ok(migrate(document)),
            Err(parse_err) => {
                if let Some(backup) = self.load_from_backup().await {
                    log::warn!(
                        "storage document {} unreadable, restored from backup: {}",
                        self.path.display(),
                        parse_err
                    );
                    return Ok(migrate(backup));
                }
                Err(StorageError::Parse(parse_err.to_string()))
            }
        }
    }

    async fn load_from_backup(&self) -> Option<StorageDocument> {
        for backup in backup_paths(&self.path) {
            let Ok(data) = fs::read_to_string(&backup).await else {
                continue;
            };
            if let Ok(document) = serde_json::from_str::<StorageDocument>(&data) {
                return Some(document);
            }
        }
        None
    }

    async fn save(&self, document: &StorageDocument) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Write(format!("create_dir_all: {}", e)))?;
        }
        let json = serde_json::to_vec_pretty(document)
            .map_err(|e| StorageError::Serialize(e.to_string()))?;

        // Atomic write: write to temp file, then rename
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)
                .await
                .map_err(|e| StorageError::Write(format!("create tmp: {}", e)))?;
            file.write_all(&json)
                .await
                .map_err(|e| StorageError::Write(format!("write tmp: {}", e)))?;
            file.flush()
                .await
                .map_err(|e| StorageError::Write(format!("flush tmp: {}", e)))?;
        }
        rotate_backups(&self.path).await;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StorageError::Write(format!("rename: {}", e)))?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    async fn get(&self, keys: &[String]) -> StorageResult<HashMap<String, Value>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.load().await?);
        }
        let Some(document) = cache.as_ref() else {
            return Ok(HashMap::new());
        };
        Ok(keys
            .iter()
            .filter_map(|key| {
                document
                    .entries
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> StorageResult<()> {
        let mut cache = self.cache.lock().await;
        let mut document = match cache.take() {
            Some(document) => document,
            None => self.load().await?,
        };
        document.entries.extend(entries);
        let result = self.save(&document).await;
        *cache = Some(document);
        result
    }
}

fn migrate(mut document: StorageDocument) -> StorageDocument {
    if document.schema_version < SCHEMA_VERSION {
        document.schema_version = SCHEMA_VERSION;
    }
    document
}

/// Newest first.
fn backup_paths(path: &Path) -> [PathBuf; 3] {
    [
        path.with_extension("json.bak"),
        path.with_extension("json.bak.1"),
        path.with_extension("json.bak.2"),
    ]
}

async fn rotate_backups(path: &Path) {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return;
    }
    let [bak, bak1, bak2] = backup_paths(path);

    let _ = fs::remove_file(&bak2).await;
    if fs::try_exists(&bak1).await.unwrap_or(false) {
        let _ = fs::rename(&bak1, &bak2).await;
    }
    if fs::try_exists(&bak).await.unwrap_or(false) {
        let _ = fs::rename(&bak, &bak1).await;
    }
    let _ = fs::copy(path, &bak).await;
}
