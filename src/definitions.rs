//! definitions — declared automation / script / scene identifiers.
//!
//! Источники для категории C:
//! - `<config>/<c>/*.yaml|*.yml`  — папка фрагментов (`automation/`, `script/`, `scene/`);
//! - `<config>/<c>s.yaml`         — сводный файл (`automations.yaml`, ...);
//! - `<config>/.storage/<c>s`     — UI-хранилище, `data.items[].id`.
//!
//! YAML не парсим: берём строки вида `[- ]id: value` регуляркой по всему файлу.
//! Для скриптов дополнительно берём ключи верхнего уровня (`morning_lights:`),
//! потому что unique_id script-сущности — это ключ, а не поле `id:`.
//!
//! Нечитаемые и битые источники пропускаются молча; нет источников — пустое множество.

use log::debug;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::CleanupConfig;
use crate::consts::STORAGE_DIR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Automation,
    Script,
    Scene,
}

impl DefinitionKind {
    pub const ALL: [DefinitionKind; 3] = [
        DefinitionKind::Automation,
        DefinitionKind::Script,
        DefinitionKind::Scene,
    ];

    /// Registry `platform` → kind.
    pub fn from_platform(platform: &str) -> Option<Self> {
        match platform {
            "automation" => Some(DefinitionKind::Automation),
            "script" => Some(DefinitionKind::Script),
            "scene" => Some(DefinitionKind::Scene),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Automation => "automation",
            DefinitionKind::Script => "script",
            DefinitionKind::Scene => "scene",
        }
    }

    fn plural(&self) -> &'static str {
        match self {
            DefinitionKind::Automation => "automations",
            DefinitionKind::Script => "scripts",
            DefinitionKind::Scene => "scenes",
        }
    }
}

/// Where definitions of one kind live.
#[derive(Debug, Clone)]
pub struct DefinitionSources {
    pub kind: DefinitionKind,
    pub fragments_dir: PathBuf,
    pub consolidated: Option<PathBuf>,
    pub ui_store: Option<PathBuf>,
}

impl DefinitionSources {
    pub fn for_kind(config_dir: &Path, kind: DefinitionKind) -> Self {
        Self {
            kind,
            fragments_dir: config_dir.join(kind.as_str()),
            consolidated: Some(config_dir.join(format!("{}.yaml", kind.plural()))),
            ui_store: Some(config_dir.join(STORAGE_DIR).join(kind.plural())),
        }
    }

    /// Union of identifiers from every readable source.
    pub fn collect_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();

        for f in yaml_files_in(&self.fragments_dir) {
            if let Ok(text) = fs::read_to_string(&f) {
                self.extend_from_yaml(&text, &mut ids);
            }
        }

        if let Some(p) = &self.consolidated {
            if let Ok(text) = fs::read_to_string(p) {
                self.extend_from_yaml(&text, &mut ids);
            }
        }

        if let Some(p) = &self.ui_store {
            if let Ok(bytes) = fs::read(p) {
                ids.extend(extract_store_ids(&bytes));
            }
        }

        debug!("definitions: {} {} id(s)", ids.len(), self.kind.as_str());
        ids
    }

    fn extend_from_yaml(&self, text: &str, ids: &mut HashSet<String>) {
        ids.extend(extract_yaml_ids(text));
        if self.kind == DefinitionKind::Script {
            ids.extend(extract_top_level_keys(text));
        }
    }
}

/// Identifier sets for the three definition kinds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionIndex {
    pub automations: HashSet<String>,
    pub scripts: HashSet<String>,
    pub scenes: HashSet<String>,
}

impl DefinitionIndex {
    pub fn load(cfg: &CleanupConfig) -> Self {
        let collect = |k| DefinitionSources::for_kind(&cfg.config_dir, k).collect_ids();
        Self {
            automations: collect(DefinitionKind::Automation),
            scripts: collect(DefinitionKind::Script),
            scenes: collect(DefinitionKind::Scene),
        }
    }

    pub fn ids(&self, kind: DefinitionKind) -> &HashSet<String> {
        match kind {
            DefinitionKind::Automation => &self.automations,
            DefinitionKind::Script => &self.scripts,
            DefinitionKind::Scene => &self.scenes,
        }
    }
}

fn id_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "..." | '...' | bare; у bare `#` начинает комментарий только после пробела
        Regex::new(
            r##"(?m)^[ \t]*(?:-[ \t]*)?id:[ \t]*(?:"([^"\r\n]*)"|'([^'\r\n]*)'|([^ \t\r\n#"'][^\r\n]*?))(?:[ \t]+#.*|[ \t]*)\r?$"##,
        )
        .expect("id line pattern")
    })
}

fn top_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^([A-Za-z0-9_]+):[ \t]*(?:#.*)?\r?$"#).expect("top-level key pattern")
    })
}

/// `id:` values anywhere in the text (one per line, quoted or bare).
pub fn extract_yaml_ids(text: &str) -> HashSet<String> {
    id_line_re()
        .captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Column-0 mapping keys without inline value (`name:` opening a block).
pub fn extract_top_level_keys(text: &str) -> HashSet<String> {
    top_key_re()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `data.items[].id` of a UI descriptor store; anything malformed yields nothing.
pub fn extract_store_ids(bytes: &[u8]) -> HashSet<String> {
    let Ok(v) = serde_json::from_slice::<Value>(bytes) else {
        return HashSet::new();
    };
    v.get("data")
        .and_then(|d| d.get("items"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|it| match it.get("id") {
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn yaml_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(rd) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = rd
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_bare_quoted_and_listed() {
        let text = "\
- id: '1700000000001'
  alias: Lights on
- id: \"abc\"
  trigger: []
-   id: plain_id   # comment
  nested:
    id: inner
- id: \"abc#1\"
- id: \"it's\"   # apostrophe inside double quotes
- id: 'x # y'
- id: bare#hash
";
        let ids = extract_yaml_ids(text);
        let expected: HashSet<String> = [
            "1700000000001",
            "abc",
            "plain_id",
            "inner",
            "abc#1",
            "it's",
            "x # y",
            "bare#hash",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn similar_keys_do_not_match() {
        let ids = extract_yaml_ids("device_id: abc\nentity_id: light.x\nid:\n");
        assert!(ids.is_empty());
    }

    #[test]
    fn script_keys_are_top_level_only() {
        let keys = extract_top_level_keys("morning:\n  alias: M\n  sequence: []\nevening: # x\n");
        assert!(keys.contains("morning"));
        assert!(keys.contains("evening"));
        assert!(!keys.contains("alias"));
    }

    #[test]
    fn store_ids_and_garbage() {
        let ids = extract_store_ids(br#"{"data":{"items":[{"id":"a"},{"id":7},{"alias":"x"}]}}"#);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a") && ids.contains("7"));
        assert!(extract_store_ids(b"not json").is_empty());
        assert!(extract_store_ids(br#"{"data":{}}"#).is_empty());
    }
}
