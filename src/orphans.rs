//! orphans — classify registry entities as live or orphaned.
//!
//! Два независимых сигнала:
//! - reference: device_id / config_entry_id присутствует (не null, не пусто) и
//!   указывает на id, которого нет в соответствующем реестре;
//! - definition (только automation/script/scene): unique_id присутствует и его
//!   нет в индексе определений этой категории.
//!
//! Для automation/script/scene результат определяется ТОЛЬКО вторым сигналом
//! (перекрывает reference целиком); без unique_id такая сущность не сирота
//! никогда. Для остальных — только первый сигнал.
//!
//! Чистая функция от загруженного состояния; запись делает cleanup.

use log::warn;
use std::collections::HashSet;

use crate::config::CleanupConfig;
use crate::definitions::{DefinitionIndex, DefinitionKind};
use crate::error::CleanupError;
use crate::registry::{DocCache, Entity, RegistryDoc, RegistryStore};

/// (category, entity_id, display_name)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Orphan {
    pub category: String,
    pub entity_id: String,
    pub name: String,
}

/// Why an entity was classified as orphaned (for dry-run listings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanReason {
    MissingDevice,
    MissingConfigEntry,
    MissingDefinition,
}

impl OrphanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrphanReason::MissingDevice => "device gone",
            OrphanReason::MissingConfigEntry => "config entry gone",
            OrphanReason::MissingDefinition => "definition gone",
        }
    }
}

pub struct KnownIds<'a> {
    pub devices: &'a HashSet<String>,
    pub config_entries: &'a HashSet<String>,
    pub definitions: &'a DefinitionIndex,
}

/// Classify one entity. None = live.
pub fn classify(entity: &Entity, known: &KnownIds<'_>) -> Option<OrphanReason> {
    if let Some(kind) = DefinitionKind::from_platform(&entity.platform) {
        let uid = entity.unique_ref()?;
        return if known.definitions.ids(kind).contains(uid) {
            None
        } else {
            Some(OrphanReason::MissingDefinition)
        };
    }

    if let Some(did) = entity.device_ref() {
        if !known.devices.contains(did) {
            return Some(OrphanReason::MissingDevice);
        }
    }
    if let Some(cid) = entity.config_entry_ref() {
        if !known.config_entries.contains(cid) {
            return Some(OrphanReason::MissingConfigEntry);
        }
    }
    None
}

/// Orphans of `entities`, sorted by (category, entity_id).
pub fn find_orphans(
    entities: &RegistryDoc,
    devices: &RegistryDoc,
    config_entries: &RegistryDoc,
    definitions: &DefinitionIndex,
) -> Vec<(Orphan, OrphanReason)> {
    let device_ids = devices.device_ids();
    let entry_ids = config_entries.config_entry_ids();
    let known = KnownIds {
        devices: &device_ids,
        config_entries: &entry_ids,
        definitions,
    };

    let mut out: Vec<(Orphan, OrphanReason)> = entities
        .entities()
        .into_iter()
        .filter_map(|e| {
            classify(&e, &known).map(|reason| {
                (
                    Orphan {
                        category: e.platform.clone(),
                        name: e.display_name().to_string(),
                        entity_id: e.entity_id,
                    },
                    reason,
                )
            })
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

/// Load the three registries and the definition index, then detect.
///
/// A missing or unparseable registry short-circuits to an empty list with a warning.
pub fn detect_orphans<C: DocCache>(
    store: &mut RegistryStore<C>,
    cfg: &CleanupConfig,
) -> Vec<(Orphan, OrphanReason)> {
    let mut load = |p: std::path::PathBuf| match store.load(&p) {
        Ok(doc) => Some(doc),
        Err(CleanupError::NotFound(_)) => {
            warn!("orphans: {} not found, skipping detection", p.display());
            None
        }
        Err(e) => {
            warn!("orphans: {}, skipping detection", e);
            None
        }
    };

    let Some(entities) = load(cfg.entity_registry()) else {
        return Vec::new();
    };
    let Some(devices) = load(cfg.device_registry()) else {
        return Vec::new();
    };
    let Some(entries) = load(cfg.config_entries()) else {
        return Vec::new();
    };

    let definitions = DefinitionIndex::load(cfg);
    find_orphans(&entities, &devices, &entries, &definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reg(key: &str, items: serde_json::Value) -> RegistryDoc {
        RegistryDoc::from_value(json!({"data": {key: items}}))
    }

    fn ids(v: &[(Orphan, OrphanReason)]) -> Vec<&str> {
        v.iter().map(|(o, _)| o.entity_id.as_str()).collect()
    }

    #[test]
    fn dangling_device_is_orphan() {
        let ents = reg(
            "entities",
            json!([
                {"entity_id": "sensor.a", "platform": "zha", "device_id": "d1"},
                {"entity_id": "sensor.b", "platform": "zha", "device_id": "d2"}
            ]),
        );
        let devs = reg("devices", json!([{"id": "d1"}]));
        let entries = reg("entries", json!([]));
        let got = find_orphans(&ents, &devs, &entries, &DefinitionIndex::default());
        assert_eq!(ids(&got), vec!["sensor.b"]);
        assert_eq!(got[0].1, OrphanReason::MissingDevice);
    }

    #[test]
    fn null_and_absent_references_are_not_evidence() {
        let ents = reg(
            "entities",
            json!([
                {"entity_id": "sensor.a", "platform": "template", "device_id": null},
                {"entity_id": "sensor.b", "platform": "template", "config_entry_id": ""},
                {"entity_id": "sensor.c", "platform": "template"}
            ]),
        );
        let empty_d = reg("devices", json!([]));
        let empty_e = reg("entries", json!([]));
        assert!(find_orphans(&ents, &empty_d, &empty_e, &DefinitionIndex::default()).is_empty());
    }

    #[test]
    fn automation_follows_definition_only() {
        let ents = reg(
            "entities",
            json!([
                {"entity_id": "automation.c", "platform": "automation", "unique_id": "auto1",
                 "device_id": "gone", "config_entry_id": "gone"}
            ]),
        );
        let devs = reg("devices", json!([]));
        let entries = reg("entries", json!([]));

        let mut defs = DefinitionIndex::default();
        defs.automations.extend(["auto1".to_string(), "auto2".to_string()]);
        assert!(find_orphans(&ents, &devs, &entries, &defs).is_empty());

        let mut defs = DefinitionIndex::default();
        defs.automations.insert("auto2".to_string());
        let got = find_orphans(&ents, &devs, &entries, &defs);
        assert_eq!(ids(&got), vec!["automation.c"]);
        assert_eq!(got[0].1, OrphanReason::MissingDefinition);
    }

    #[test]
    fn script_without_unique_id_is_never_orphan() {
        let ents = reg(
            "entities",
            json!([{"entity_id": "script.x", "platform": "script", "device_id": "gone"}]),
        );
        let got = find_orphans(
            &ents,
            &reg("devices", json!([])),
            &reg("entries", json!([])),
            &DefinitionIndex::default(),
        );
        assert!(got.is_empty());
    }

    #[test]
    fn output_sorted_by_category_then_id() {
        let ents = reg(
            "entities",
            json!([
                {"entity_id": "sensor.z", "platform": "zha", "device_id": "x"},
                {"entity_id": "light.a", "platform": "hue", "device_id": "x", "original_name": "A"},
                {"entity_id": "sensor.b", "platform": "zha", "device_id": "x"}
            ]),
        );
        let got = find_orphans(
            &ents,
            &reg("devices", json!([])),
            &reg("entries", json!([])),
            &DefinitionIndex::default(),
        );
        assert_eq!(ids(&got), vec!["light.a", "sensor.b", "sensor.z"]);
        assert_eq!(got[0].0.name, "A");
    }
}
