//! suffix — entity ids with a numeric disambiguation suffix whose base id is gone.
//!
//! `sensor.power_2` попадает в кандидаты, только если `sensor.power` в реестре нет.
//! Суффиксы `_0` / `_1` и с ведущим нулём (`_02`) не рассматриваются.
//!
//! Детектор только советует: цифра в конце часто часть настоящего имени
//! (`sensor.floor_2`), поэтому применяются лишь явно выбранные оператором пары.

use std::collections::HashSet;

use crate::registry::doc::entity_domain;
use crate::registry::RegistryDoc;

/// (old id, candidate base id, category = entity domain)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SuffixCollision {
    pub old_id: String,
    pub base_id: String,
    pub category: String,
}

/// `light.desk_17` → Some(("light.desk", 17)). None for `_0`, `_1`, `_01`, or no suffix.
pub fn split_numeric_suffix(entity_id: &str) -> Option<(&str, u64)> {
    let (domain, object) = entity_id.split_once('.')?;
    let pos = object.rfind('_')?;
    let digits = &object[pos + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || digits.starts_with('0') {
        return None;
    }
    let n: u64 = digits.parse().ok()?;
    if n < 2 || pos == 0 || domain.is_empty() {
        return None;
    }
    Some((&entity_id[..domain.len() + 1 + pos], n))
}

/// Candidates in registry order.
pub fn find_suffix_collisions(doc: &RegistryDoc) -> Vec<SuffixCollision> {
    let ids: Vec<String> = doc
        .entity_values()
        .iter()
        .filter_map(|v| v.get("entity_id").and_then(|x| x.as_str()))
        .map(str::to_string)
        .collect();
    let present: HashSet<&str> = ids.iter().map(String::as_str).collect();

    ids.iter()
        .filter_map(|id| {
            let (base, _) = split_numeric_suffix(id)?;
            if present.contains(base) {
                return None;
            }
            Some(SuffixCollision {
                old_id: id.clone(),
                base_id: base.to_string(),
                category: entity_domain(id).to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reg(ids: &[&str]) -> RegistryDoc {
        let ents: Vec<_> = ids
            .iter()
            .map(|id| json!({"entity_id": id, "platform": "x"}))
            .collect();
        RegistryDoc::from_value(json!({"data": {"entities": ents}}))
    }

    #[test]
    fn split_accepts_two_and_above() {
        assert_eq!(split_numeric_suffix("sensor.power_2"), Some(("sensor.power", 2)));
        assert_eq!(split_numeric_suffix("light.desk_17"), Some(("light.desk", 17)));
        assert_eq!(split_numeric_suffix("sensor.power_1"), None);
        assert_eq!(split_numeric_suffix("sensor.power_0"), None);
        assert_eq!(split_numeric_suffix("sensor.power_02"), None);
        assert_eq!(split_numeric_suffix("sensor.power"), None);
        assert_eq!(split_numeric_suffix("sensor._2"), None);
        assert_eq!(split_numeric_suffix("sensor.power_2a"), None);
    }

    #[test]
    fn flagged_only_when_base_absent() {
        let got = find_suffix_collisions(&reg(&["sensor.power_2"]));
        assert_eq!(
            got,
            vec![SuffixCollision {
                old_id: "sensor.power_2".into(),
                base_id: "sensor.power".into(),
                category: "sensor".into(),
            }]
        );

        assert!(find_suffix_collisions(&reg(&["sensor.power", "sensor.power_2"])).is_empty());
    }

    #[test]
    fn base_of_other_domain_does_not_count() {
        let got = find_suffix_collisions(&reg(&["switch.power", "sensor.power_3"]));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].base_id, "sensor.power");
    }
}
