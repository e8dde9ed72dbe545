//! 영구 키/값 저장소 경계.
//!
//! 영구 캐시는 [`DurableStore`]만 알면 동작합니다. 기본 구현은 두 가지입니다:
//! - [`MemoryStore`]: 프로세스 메모리 (용량 한도 포함)
//! - [`FileStore`]: JSON 파일 스냅샷 (재시작 후에도 유지)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// 호스트가 제공하는 문자열 키/값 저장소.
///
/// 키 열거는 `len()` + `key(index)`, 일괄 처리는 `keys()` + `remove_many()`로 이루어집니다.
pub trait DurableStore: Send + Sync {
    /// 키에 해당하는 값.
    fn get(&self, key: &str) -> Option<String>;

    /// 값을 저장합니다. 용량 초과 시 [`StoreError::QuotaExceeded`].
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// 키를 삭제합니다. 없는 키는 무시합니다.
    fn remove(&self, key: &str);

    /// 저장된 키 개수.
    fn len(&self) -> usize;

    /// `index`번째 키.
    fn key(&self, index: usize) -> Option<String>;

    /// 비어 있는지 확인.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 저장된 모든 키의 스냅샷.
    fn keys(&self) -> Vec<String> {
        (0..self.len()).filter_map(|index| self.key(index)).collect()
    }

    /// 여러 키를 한 번에 삭제합니다. 없는 키는 무시합니다.
    fn remove_many(&self, keys: &[String]) {
        for key in keys {
            self.remove(key);
        }
    }
}

/// 용량(바이트)을 추적하는 키/값 맵.
#[derive(Debug, Default)]
struct Entries {
    map: BTreeMap<String, String>,
    used_bytes: usize,
}

impl Entries {
    fn from_map(map: BTreeMap<String, String>) -> Self {
        let used_bytes = map.iter().map(|(k, v)| k.len() + v.len()).sum();
        Self { map, used_bytes }
    }

    /// 용량을 확인한 뒤 저장하고 이전 값을 돌려줍니다.
    fn insert(&mut self, key: &str, value: &str, quota: Option<usize>) -> Result<Option<String>> {
        let freed = self.map.get(key).map_or(0, |old| key.len() + old.len());
        let needed = key.len() + value.len();
        let after = self.used_bytes - freed + needed;

        if let Some(quota) = quota {
            if after > quota {
                return Err(StoreError::QuotaExceeded {
                    needed,
                    available: quota.saturating_sub(self.used_bytes - freed),
                });
            }
        }

        self.used_bytes = after;
        Ok(self.map.insert(key.to_string(), value.to_string()))
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        let old = self.map.remove(key)?;
        self.used_bytes -= key.len() + old.len();
        Some(old)
    }

    /// `insert` 이전 상태로 되돌립니다.
    fn restore(&mut self, key: &str, previous: Option<String>) {
        self.remove(key);
        if let Some(previous) = previous {
            let _ = self.insert(key, &previous, None);
        }
    }
}

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 프로세스 메모리 저장소.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// 용량 제한 없는 저장소.
    pub fn new() -> Self {
        Self::default()
    }

    /// 용량(키 + 값 바이트 합) 제한이 있는 저장소.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// 현재 사용량 (바이트).
    pub fn used_bytes(&self) -> usize {
        lock(&self.entries).used_bytes
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).map.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.entries).insert(key, value, self.quota_bytes)?;
        Ok(())
    }

    fn remove(&self, key: &str) {
        lock(&self.entries).remove(key);
    }

    fn len(&self) -> usize {
        lock(&self.entries).map.len()
    }

    fn key(&self, index: usize) -> Option<String> {
        lock(&self.entries).map.keys().nth(index).cloned()
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).map.keys().cloned().collect()
    }

    fn remove_many(&self, keys: &[String]) {
        let mut entries = lock(&self.entries);
        for key in keys {
            entries.remove(key);
        }
    }
}

/// JSON 파일 스냅샷 저장소.
///
/// 변경마다 전체 맵을 임시 파일에 쓰고 rename으로 교체합니다.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Entries>,
    quota_bytes: Option<usize>,
}

impl FileStore {
    /// 파일을 열거나 새로 만듭니다.
    ///
    /// 파일 내용이 손상된 경우 경고를 남기고 빈 저장소로 시작합니다.
    pub fn open(path: impl AsRef<Path>, quota_bytes: Option<usize>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let map = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Corrupt store file, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = map.len(), "File store opened");

        Ok(Self {
            path,
            entries: Mutex::new(Entries::from_map(map)),
            quota_bytes,
        })
    }

    /// 저장 파일 경로.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Entries) -> Result<()> {
        let json = serde_json::to_string(&entries.map)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).map.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = lock(&self.entries);
        let previous = entries.insert(key, value, self.quota_bytes)?;

        if let Err(e) = self.persist(&entries) {
            entries.restore(key, previous);
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_some() {
            if let Err(e) = self.persist(&entries) {
                warn!(key = key, error = %e, "Failed to persist store after remove");
            }
        }
    }

    fn len(&self) -> usize {
        lock(&self.entries).map.len()
    }

    fn key(&self, index: usize) -> Option<String> {
        lock(&self.entries).map.keys().nth(index).cloned()
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).map.keys().cloned().collect()
    }

    /// 파일은 한 번만 다시 씁니다.
    fn remove_many(&self, keys: &[String]) {
        let mut entries = lock(&self.entries);
        let removed = keys
            .iter()
            .filter(|key| entries.remove(key).is_some())
            .count();

        if removed > 0 {
            if let Err(e) = self.persist(&entries) {
                warn!(removed = removed, error = %e, "Failed to persist store after batch remove");
            }
        }
    }
}
