//! registry/cache — мемоизация разобранных реестров в пределах одного запуска.
//!
//! Ключ = (канонизированный путь, mtime файла). Запись по пути инвалидирует
//! запись кэша; после брекета stop/start HA кэш сбрасывается целиком, т.к.
//! HA мог переписать файлы сам.
//!
//! Кэш — явный объект (trait DocCache), его передают в RegistryStore. Тесты
//! подсовывают свой и проверяют инвалидацию без гонок по времени ФС.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::doc::RegistryDoc;

pub trait DocCache {
    /// Cached (mtime, document) for `path`, if any.
    fn get(&self, path: &Path) -> Option<(SystemTime, RegistryDoc)>;
    fn put(&mut self, path: &Path, mtime: SystemTime, doc: RegistryDoc);
    fn invalidate(&mut self, path: &Path);
    fn invalidate_all(&mut self);
}

/// Default in-process cache.
#[derive(Debug, Default)]
pub struct MtimeCache {
    map: HashMap<PathBuf, (SystemTime, RegistryDoc)>,
}

impl MtimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.map.contains_key(&canonical(path))
    }
}

impl DocCache for MtimeCache {
    fn get(&self, path: &Path) -> Option<(SystemTime, RegistryDoc)> {
        self.map.get(&canonical(path)).cloned()
    }

    fn put(&mut self, path: &Path, mtime: SystemTime, doc: RegistryDoc) {
        self.map.insert(canonical(path), (mtime, doc));
    }

    fn invalidate(&mut self, path: &Path) {
        self.map.remove(&canonical(path));
    }

    fn invalidate_all(&mut self) {
        self.map.clear();
    }
}

/// Disabled cache: every load re-reads the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl DocCache for NoCache {
    fn get(&self, _path: &Path) -> Option<(SystemTime, RegistryDoc)> {
        None
    }
    fn put(&mut self, _path: &Path, _mtime: SystemTime, _doc: RegistryDoc) {}
    fn invalidate(&mut self, _path: &Path) {}
    fn invalidate_all(&mut self) {}
}

// Канонизируем путь, чтобы rel/abs/symlink формы давали один ключ.
fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn doc(n: u64) -> RegistryDoc {
        RegistryDoc::from_value(json!({"version": n, "data": {"entities": []}}))
    }

    #[test]
    fn put_then_get_returns_mtime_and_doc() {
        let mut c = MtimeCache::new();
        let p = Path::new("/nonexistent/core.entity_registry");
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        c.put(p, t0, doc(1));
        c.put(p, t0 + Duration::from_secs(1), doc(2));

        assert_eq!(c.get(p), Some((t0 + Duration::from_secs(1), doc(2))));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn invalidate_single_and_all() {
        let mut c = MtimeCache::new();
        let a = Path::new("/nonexistent/a");
        let b = Path::new("/nonexistent/b");
        let t = SystemTime::UNIX_EPOCH;
        c.put(a, t, doc(1));
        c.put(b, t, doc(2));

        c.invalidate(a);
        assert!(!c.contains(a));
        assert!(c.contains(b));

        c.invalidate_all();
        assert!(c.is_empty());
    }
}
