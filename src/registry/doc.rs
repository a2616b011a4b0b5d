//! Registry documents (`.storage/core.*`) and the typed entity view.
//!
//! Документ хранится как serde_json::Value целиком: все поля, которые мы не
//! трогаем, должны пережить load → save без изменений (порядок ключей тоже,
//! см. feature preserve_order).

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{CleanupError, Result};

pub const ENTITIES_KEY: &str = "entities";
pub const DEVICES_KEY: &str = "devices";
pub const ENTRIES_KEY: &str = "entries";
pub const DELETED_ENTITIES_KEY: &str = "deleted_entities";
pub const DELETED_DEVICES_KEY: &str = "deleted_devices";

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryDoc {
    root: Value,
}

impl RegistryDoc {
    /// Parse raw bytes; the top level must be a JSON object.
    pub fn from_slice(path: &Path, bytes: &[u8]) -> Result<Self> {
        let root: Value = serde_json::from_slice(bytes)
            .map_err(|e| CleanupError::invalid(path, e.to_string()))?;
        if !root.is_object() {
            return Err(CleanupError::invalid(path, "top level is not an object"));
        }
        Ok(Self { root })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// 2-space pretty JSON, non-ASCII as is.
    pub fn to_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.root).map_err(|e| CleanupError::invalid(path, e.to_string()))
    }

    /// `data.<key>` as an array, if present.
    pub fn list(&self, key: &str) -> Option<&Vec<Value>> {
        self.root.get("data")?.get(key)?.as_array()
    }

    pub fn list_mut(&mut self, key: &str) -> Option<&mut Vec<Value>> {
        self.root.get_mut("data")?.get_mut(key)?.as_array_mut()
    }

    /// Expected shape `{ "data": { "<key>": [...] } }`.
    pub fn has_list(&self, key: &str) -> bool {
        self.list(key).is_some()
    }

    pub fn list_len(&self, key: &str) -> usize {
        self.list(key).map(|l| l.len()).unwrap_or(0)
    }

    /// Set of string ids `data.<key>[].<field>`; items without the field are ignored.
    pub fn id_set(&self, key: &str, field: &str) -> HashSet<String> {
        self.list(key)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|it| it.get(field).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw entity objects (`data.entities`), empty if the shape is wrong.
    pub fn entity_values(&self) -> &[Value] {
        self.list(ENTITIES_KEY).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Typed entity views; malformed items (no `entity_id`) are skipped.
    pub fn entities(&self) -> Vec<Entity> {
        self.entity_values()
            .iter()
            .filter_map(Entity::from_value)
            .collect()
    }

    pub fn entity_ids(&self) -> HashSet<String> {
        self.id_set(ENTITIES_KEY, "entity_id")
    }

    pub fn device_ids(&self) -> HashSet<String> {
        self.id_set(DEVICES_KEY, "id")
    }

    pub fn config_entry_ids(&self) -> HashSet<String> {
        self.id_set(ENTRIES_KEY, "entry_id")
    }
}

/// Typed read-only view of one `data.entities[]` item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub config_entry_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
}

impl Entity {
    pub fn from_value(v: &Value) -> Option<Self> {
        Entity::deserialize(v).ok()
    }

    /// Present and non-empty device reference.
    pub fn device_ref(&self) -> Option<&str> {
        self.device_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn config_entry_ref(&self) -> Option<&str> {
        self.config_entry_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn unique_ref(&self) -> Option<&str> {
        self.unique_id.as_deref().filter(|s| !s.is_empty())
    }

    /// original_name, затем name, иначе пусто.
    pub fn display_name(&self) -> &str {
        self.original_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    /// Domain part of `entity_id` (`sensor.power` → `sensor`).
    pub fn domain(&self) -> &str {
        entity_domain(&self.entity_id)
    }
}

pub fn entity_domain(entity_id: &str) -> &str {
    entity_id.split_once('.').map(|(d, _)| d).unwrap_or("")
}

// Некоторые интеграции пишут unique_id числом.
fn string_or_number<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(de)?;
    Ok(match v {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_view_tolerates_nulls_and_numbers() {
        let e = Entity::from_value(&json!({
            "entity_id": "sensor.x",
            "platform": "zha",
            "device_id": null,
            "unique_id": 42,
            "name": "Kitchen"
        }))
        .unwrap();
        assert_eq!(e.device_ref(), None);
        assert_eq!(e.unique_ref(), Some("42"));
        assert_eq!(e.display_name(), "Kitchen");
        assert_eq!(e.domain(), "sensor");
    }

    #[test]
    fn item_without_entity_id_is_skipped() {
        let doc = RegistryDoc::from_value(json!({
            "data": {"entities": [{"platform": "x"}, {"entity_id": "light.a", "platform": "hue"}]}
        }));
        let ents = doc.entities();
        assert_eq!(ents.len(), 1);
        assert_eq!(ents[0].entity_id, "light.a");
    }

    #[test]
    fn serialization_keeps_key_order_and_unicode() {
        let src = "{\n  \"version\": 1,\n  \"data\": {\n    \"entities\": [\n      {\n        \"entity_id\": \"light.kuche\",\n        \"original_name\": \"Küche\"\n      }\n    ]\n  }\n}";
        let doc = RegistryDoc::from_slice(Path::new("x"), src.as_bytes()).unwrap();
        let out = doc.to_bytes(Path::new("x")).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), src);
    }

    #[test]
    fn non_object_top_level_is_invalid() {
        let err = RegistryDoc::from_slice(Path::new("x"), b"[1,2]").unwrap_err();
        assert!(matches!(err, CleanupError::InvalidFormat { .. }));
    }
}
