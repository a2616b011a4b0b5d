// tests/snapshot_restore.rs
//
// Запуск только этого файла:
//   cargo test --test snapshot_restore -- --nocapture
//
// Покрываем:
// 1) backup: имя <file>.backup.<ts>, mtime исходника, коллизия в ту же секунду не перезаписывает.
// 2) scan: новые первыми, битые снапшоты пропускаются, категория по имени,
//    имя без даты → время из mtime.
// 3) diff {A,B} vs {A,C} + выборочный restore (конфликт по id → skip).
// 4) Полный restore: live == снапшот байт-в-байт, старый live сохранён снапшотом.
// 5) Retention: старые снапшоты удаляются, свежие и live-файлы — нет.

use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::{json, Value};

use HaCleanup::selection::parse_selection;
use HaCleanup::snapshots::diff::diff_snapshot;
use HaCleanup::snapshots::{
    backup_file_at, full_restore, plan_full_restore, prune_snapshots, restore_entities,
    scan_snapshots, SnapshotKind,
};
use HaCleanup::{CleanupError, RegistryStore};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("hacleanup-snap-{prefix}-{pid}-{t}-{id}"))
}

fn storage(prefix: &str) -> Result<PathBuf> {
    let dir = unique_root(prefix).join(".storage");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn entity_reg(ids: &[&str]) -> Value {
    let ents: Vec<Value> = ids
        .iter()
        .map(|id| json!({"entity_id": id, "platform": "hue", "original_name": id.to_uppercase()}))
        .collect();
    json!({"version": 1, "key": "core.entity_registry", "data": {"entities": ents}})
}

fn write_json(path: &Path, v: &Value) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(v)?)?;
    Ok(())
}

fn ts(h: u32, m: u32, s: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

#[test]
fn backup_naming_times_and_collision() -> Result<()> {
    let dir = storage("naming")?;
    let live = dir.join("core.entity_registry");
    write_json(&live, &entity_reg(&["light.a"]))?;
    let old = SystemTime::now() - Duration::from_secs(3 * 86_400);
    File::options()
        .write(true)
        .open(&live)?
        .set_times(FileTimes::new().set_modified(old))?;

    let snap = backup_file_at(&live, ts(12, 0, 0))?;
    assert_eq!(
        snap.file_name().unwrap().to_str().unwrap(),
        "core.entity_registry.backup.20240301_120000"
    );
    assert_eq!(fs::read(&snap)?, fs::read(&live)?);
    assert_eq!(fs::metadata(&snap)?.modified()?, fs::metadata(&live)?.modified()?);

    // та же секунда: существующий снапшот не перезаписывается
    let first = fs::read(&snap)?;
    write_json(&live, &entity_reg(&["light.a", "light.b"]))?;
    let again = backup_file_at(&live, ts(12, 0, 0))?;
    assert_eq!(again, snap);
    assert_eq!(fs::read(&snap)?, first);

    // отсутствующий файл
    let missing = backup_file_at(&dir.join("core.nothing"), ts(12, 0, 1));
    assert!(matches!(missing, Err(CleanupError::NotFound(_))));

    fs::remove_dir_all(dir.parent().unwrap()).ok();
    Ok(())
}

#[test]
fn scan_newest_first_and_skips_broken() -> Result<()> {
    let dir = storage("scan")?;
    write_json(&dir.join("core.entity_registry.backup.20240101_000000"), &entity_reg(&["a.a"]))?;
    write_json(&dir.join("core.entity_registry.backup.20240301_000000"), &entity_reg(&["a.a", "a.b"]))?;
    write_json(
        &dir.join("core.device_registry.backup.20240201_000000"),
        &json!({"data": {"devices": [{"id": "d1"}]}}),
    )?;
    fs::write(dir.join("core.config_entries.backup.20240401_000000"), b"garbage")?;
    write_json(&dir.join("core.entity_registry"), &entity_reg(&["a.a"]))?;

    // имя без даты: время берётся из mtime (2024-02-15, между 02-01 и 03-01 в любом поясе)
    let undated = dir.join("core.entity_registry.backup.garbage");
    write_json(&undated, &entity_reg(&["a.a", "a.b", "a.c"]))?;
    let mtime = UNIX_EPOCH + Duration::from_secs(1_708_000_000);
    File::options()
        .write(true)
        .open(&undated)?
        .set_times(FileTimes::new().set_modified(mtime))?;

    let list = scan_snapshots(&dir);
    let names: Vec<String> = list
        .iter()
        .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "core.entity_registry.backup.20240301_000000",
            "core.entity_registry.backup.garbage",
            "core.device_registry.backup.20240201_000000",
            "core.entity_registry.backup.20240101_000000",
        ]
    );
    assert_eq!(list[0].kind, SnapshotKind::EntityRegistry);
    assert_eq!(list[0].entity_count, 2);
    assert!(list[0].timestamp_from_name);
    assert!(!list[1].timestamp_from_name);
    assert_eq!(
        list[1].timestamp,
        chrono::DateTime::<chrono::Local>::from(mtime).naive_local()
    );
    assert_eq!(list[1].entity_count, 3);
    assert_eq!(list[2].kind, SnapshotKind::DeviceRegistry);
    assert_eq!(list[2].entity_count, 1);
    assert_eq!(list[0].live_path(), dir.join("core.entity_registry"));

    fs::remove_dir_all(dir.parent().unwrap()).ok();
    Ok(())
}

#[test]
fn diff_and_selective_restore() -> Result<()> {
    let dir = storage("selective")?;
    let live = dir.join("core.entity_registry");
    let snap = dir.join("core.entity_registry.backup.20240301_120000");
    write_json(&snap, &entity_reg(&["light.a", "light.b", "light.d"]))?;
    let mut live_doc = entity_reg(&["light.a", "light.c"]);
    live_doc["data"]["entities"][0]["original_name"] = json!("Renamed");
    write_json(&live, &live_doc)?;

    let mut store = RegistryStore::new();
    let diff = diff_snapshot(&mut store, &snap, &live)?;
    assert_eq!(diff.deleted_ids(), vec!["light.b", "light.d"]);
    assert_eq!(diff.added_ids(), vec!["light.c"]);
    assert_eq!(diff.modified.len(), 1);
    assert_eq!(diff.modified[0].entity_id, "light.a");
    assert_eq!(diff.modified[0].changes[0].field, "original_name");

    // dry-run: ничего не пишется
    let before = fs::read(&live)?;
    let sel = parse_selection("all", diff.deleted.len());
    let dry = restore_entities(&mut store, &live, &diff.deleted, &sel, true)?;
    assert_eq!(dry.appended, vec!["light.b", "light.d"]);
    assert_eq!(fs::read(&live)?, before);

    // light.d тем временем появился в live — должен быть пропущен
    let mut live_doc: Value = serde_json::from_slice(&before)?;
    live_doc["data"]["entities"]
        .as_array_mut()
        .unwrap()
        .push(json!({"entity_id": "light.d", "platform": "hue"}));
    write_json(&live, &live_doc)?;
    store.invalidate(&live);

    let out = restore_entities(&mut store, &live, &diff.deleted, &sel, false)?;
    assert_eq!(out.appended, vec!["light.b"]);
    assert_eq!(out.skipped, vec!["light.d"]);
    assert!(out.backup.as_ref().map(|b| b.exists()).unwrap_or(false));

    let doc = store.load(&live)?;
    let ids = doc.entity_ids();
    assert!(ids.contains("light.b") && ids.contains("light.c") && ids.contains("light.d"));
    assert_eq!(doc.list_len("entities"), 4);

    fs::remove_dir_all(dir.parent().unwrap()).ok();
    Ok(())
}

#[test]
fn full_restore_round_trip() -> Result<()> {
    let dir = storage("full")?;
    let live = dir.join("core.entity_registry");
    write_json(&live, &entity_reg(&["light.a", "light.b"]))?;
    let snap = backup_file_at(&live, ts(8, 0, 0))?;
    let snap_bytes = fs::read(&snap)?;

    // live сильно изменился
    write_json(&live, &entity_reg(&["light.a", "light.b", "light.c", "light.d", "light.e"]))?;
    let mut store = RegistryStore::new();
    let plan = plan_full_restore(&mut store, &snap, &live)?;
    assert_eq!(plan.snapshot_items, 2);
    assert_eq!(plan.live_items, 5);
    assert!(plan.needs_warning());

    let backup = full_restore(&mut store, &plan)?.expect("live backed up");
    assert_eq!(fs::read(&live)?, snap_bytes);
    let old_live: Value = serde_json::from_slice(&fs::read(&backup)?)?;
    assert_eq!(old_live["data"]["entities"].as_array().unwrap().len(), 5);
    assert!(!dir.join("core.entity_registry.tmp").exists());

    // снапшот неверной формы
    let bad = dir.join("core.entity_registry.backup.20240301_090000");
    write_json(&bad, &json!({"data": {"entities": {}}}))?;
    assert!(matches!(
        plan_full_restore(&mut store, &bad, &live),
        Err(CleanupError::InvalidFormat { .. })
    ));

    fs::remove_dir_all(dir.parent().unwrap()).ok();
    Ok(())
}

#[test]
fn retention_removes_only_old_snapshots() -> Result<()> {
    let dir = storage("prune")?;
    let now = SystemTime::now();
    let ten_days_ago = now - Duration::from_secs(10 * 86_400);

    let old = dir.join("core.entity_registry.backup.20200101_000000");
    let fresh_name = dir.join(format!(
        "core.entity_registry.backup.{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let live = dir.join("core.entity_registry");
    for p in [&old, &fresh_name, &live] {
        write_json(p, &entity_reg(&["a.a"]))?;
        File::options()
            .write(true)
            .open(p)?
            .set_times(FileTimes::new().set_modified(ten_days_ago))?;
    }

    let week = Duration::from_secs(7 * 86_400);
    let dry = prune_snapshots(&dir, week, now, true);
    assert_eq!(dry.removed, vec![old.clone()]);
    assert!(old.exists());

    let report = prune_snapshots(&dir, week, now, false);
    assert_eq!(report.removed_count(), 1);
    assert_eq!(report.failed, 0);
    assert!(!old.exists());
    // свежее имя спасает копию старого файла
    assert!(fresh_name.exists());
    assert!(live.exists());

    fs::remove_dir_all(dir.parent().unwrap()).ok();
    Ok(())
}
