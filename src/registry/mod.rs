//! registry — доступ к `.storage/core.*` реестрам Home Assistant.
//!
//! Состав:
//! - doc:   RegistryDoc (JSON целиком) + типизированный Entity.
//! - cache: DocCache / MtimeCache / NoCache.
//! - RegistryStore: load (с кэшем по mtime), save (tmp + lock + fsync + rename), backup.
//!
//! Запись атомарна для читателей: <name>.tmp пишется под эксклюзивным fs2-локом,
//! sync_all, затем rename поверх цели. При любой ошибке tmp удаляется, цель не
//! меняется, возвращается SaveFailed.

pub mod cache;
pub mod doc;

use log::debug;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::consts::TMP_SUFFIX;
use crate::error::{CleanupError, Result};
use crate::lock::lock_exclusive_for_write;
use crate::metrics::{record_cache_hit, record_cache_miss, record_registry_save};
use crate::snapshots::backup_file;

pub use cache::{DocCache, MtimeCache, NoCache};
pub use doc::{Entity, RegistryDoc};

pub struct RegistryStore<C: DocCache = MtimeCache> {
    cache: C,
}

impl RegistryStore<MtimeCache> {
    pub fn new() -> Self {
        Self {
            cache: MtimeCache::new(),
        }
    }
}

impl Default for RegistryStore<MtimeCache> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: DocCache> RegistryStore<C> {
    pub fn with_cache(cache: C) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Load and parse a registry document.
    ///
    /// NotFound if the file is absent, InvalidFormat if it does not parse.
    /// Served from cache when the cached mtime equals the file's current mtime.
    pub fn load(&mut self, path: &Path) -> Result<RegistryDoc> {
        let md = match fs::metadata(path) {
            Ok(md) if md.is_file() => md,
            Ok(_) => return Err(CleanupError::NotFound(path.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CleanupError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let mtime = md.modified()?;

        if let Some((cached_mtime, doc)) = self.cache.get(path) {
            if cached_mtime == mtime {
                record_cache_hit();
                return Ok(doc);
            }
        }
        record_cache_miss();

        let bytes = fs::read(path)?;
        let doc = RegistryDoc::from_slice(path, &bytes)?;
        self.cache.put(path, mtime, doc.clone());
        debug!("registry: loaded {} ({} B)", path.display(), bytes.len());
        Ok(doc)
    }

    /// Serialize and atomically replace `path`.
    pub fn save(&mut self, path: &Path, doc: &RegistryDoc) -> Result<()> {
        let bytes = doc.to_bytes(path)?;
        self.write_bytes(path, &bytes)
    }

    /// Atomically replace `path` with raw bytes (full restore writes snapshot bytes verbatim).
    pub fn write_bytes(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.write_bytes_with(path, bytes, |_| Ok(()))
    }

    /// Same as `write_bytes`, with a hook invoked after the temp file is durable and
    /// before the rename. A hook error aborts the save.
    pub(crate) fn write_bytes_with<F>(&mut self, path: &Path, bytes: &[u8], before_rename: F) -> Result<()>
    where
        F: FnOnce(&Path) -> io::Result<()>,
    {
        self.cache.invalidate(path);
        let res = write_atomic(path, bytes, before_rename);
        self.cache.invalidate(path);
        res
    }

    /// Snapshot `path` next to itself (`<path>.backup.<YYYYMMDD_HHMMSS>`).
    pub fn backup(&self, path: &Path) -> Result<PathBuf> {
        backup_file(path)
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.cache.invalidate(path);
    }

    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
    }
}

/// `<dir>/<name>.tmp` — sibling of the target, so rename stays on one filesystem.
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

fn write_atomic<F>(path: &Path, bytes: &[u8], before_rename: F) -> Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let tmp = tmp_path_for(path);

    let res = (|| -> io::Result<()> {
        let mut guard = lock_exclusive_for_write(&tmp)?;
        // truncate только под локом
        guard.file().set_len(0)?;
        guard.file_mut().write_all(bytes)?;
        guard.file_mut().flush()?;
        guard.file().sync_all()?;

        // права цели переносим на tmp (core.* обычно 0600)
        if let Ok(md) = fs::metadata(path) {
            fs::set_permissions(&tmp, md.permissions())?;
        }

        before_rename(&tmp)?;

        fs::rename(&tmp, path)?;
        drop(guard);
        sync_parent_dir(path);
        Ok(())
    })();

    match res {
        Ok(()) => {
            record_registry_save();
            debug!("registry: saved {} ({} B)", path.display(), bytes.len());
            Ok(())
        }
        Err(source) => {
            let _ = fs::remove_file(&tmp);
            Err(CleanupError::SaveFailed {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

// best-effort: fsync каталога, чтобы rename пережил падение питания
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(d) = fs::File::open(parent) {
            let _ = d.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    fn unique_root(prefix: &str) -> PathBuf {
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let p = std::env::temp_dir().join(format!(
            "hacleanup-registry-{prefix}-{}-{t}-{id}",
            std::process::id()
        ));
        fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn tmp_path_is_a_sibling_with_suffix() {
        assert_eq!(
            tmp_path_for(Path::new("/a/.storage/core.entity_registry")),
            PathBuf::from("/a/.storage/core.entity_registry.tmp")
        );
    }

    #[test]
    fn failure_before_rename_leaves_target_untouched() {
        let root = unique_root("inject");
        let target = root.join("core.entity_registry");
        let original = b"{\"data\":{\"entities\":[]}}".to_vec();
        fs::write(&target, &original).unwrap();

        let mut store = RegistryStore::new();
        let doc = RegistryDoc::from_value(json!({"data": {"entities": [{"entity_id": "a.b"}]}}));
        let bytes = doc.to_bytes(&target).unwrap();

        let err = store
            .write_bytes_with(&target, &bytes, |tmp| {
                // tmp уже полностью записан
                assert_eq!(fs::read(tmp)?, bytes);
                Err(io::Error::new(io::ErrorKind::Other, "injected"))
            })
            .unwrap_err();

        assert!(matches!(err, CleanupError::SaveFailed { .. }));
        assert_eq!(fs::read(&target).unwrap(), original);
        assert!(!tmp_path_for(&target).exists());
    }

    #[test]
    fn waiting_writer_reopens_tmp_renamed_by_previous_holder() {
        let root = unique_root("race");
        let target = root.join("core.entity_registry");
        fs::write(&target, b"ORIGINAL").unwrap();
        let tmp = tmp_path_for(&target);

        // первый писатель держит лок на tmp
        let mut held = lock_exclusive_for_write(&tmp).unwrap();
        held.file_mut().write_all(b"FROM_A").unwrap();

        let t = target.clone();
        let waiter = std::thread::spawn(move || {
            let mut store = RegistryStore::new();
            store.write_bytes(&t, b"FROM_B_xx")
        });
        std::thread::sleep(std::time::Duration::from_millis(200));

        // пока второй ждёт, первый переименовывает tmp поверх цели
        fs::rename(&tmp, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"FROM_A");
        drop(held);

        waiter.join().unwrap().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"FROM_B_xx");
        assert!(!tmp.exists());
    }

    #[test]
    fn save_invalidates_cached_entry() {
        let root = unique_root("cache");
        let target = root.join("core.device_registry");
        fs::write(&target, b"{\"data\":{\"devices\":[{\"id\":\"d1\"}]}}").unwrap();

        let mut store = RegistryStore::new();
        let first = store.load(&target).unwrap();
        assert!(store.cache().contains(&target));
        assert_eq!(first.device_ids().len(), 1);

        let updated = RegistryDoc::from_value(json!({"data": {"devices": []}}));
        store.save(&target, &updated).unwrap();
        assert!(!store.cache().contains(&target));

        let second = store.load(&target).unwrap();
        assert!(second.device_ids().is_empty());
    }

    #[test]
    fn no_cache_rereads_every_time() {
        let root = unique_root("nocache");
        let target = root.join("core.entity_registry");
        fs::write(&target, b"{\"data\":{\"entities\":[]}}").unwrap();

        let mut store = RegistryStore::with_cache(NoCache);
        assert_eq!(store.load(&target).unwrap().list_len("entities"), 0);
        // запись мимо store: без кэша изменение видно сразу
        fs::write(&target, b"{\"data\":{\"entities\":[{\"entity_id\":\"a.b\"}]}}").unwrap();
        assert_eq!(store.load(&target).unwrap().list_len("entities"), 1);
    }

    #[test]
    fn load_reports_not_found_and_invalid_format() {
        let root = unique_root("errors");
        let mut store = RegistryStore::new();

        let missing = store.load(&root.join("nope")).unwrap_err();
        assert!(missing.is_not_found());

        let bad = root.join("core.config_entries");
        fs::write(&bad, b"{not json").unwrap();
        let invalid = store.load(&bad).unwrap_err();
        assert!(matches!(invalid, CleanupError::InvalidFormat { .. }));
    }
}
