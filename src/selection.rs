//! Operator selection syntax for numbered candidate lists.
//!
//! `1,3-5,8` → {1,3,4,5,8}; `all` → 1..=max; `none`, empty, `q`, `quit` → {}.
//! Out-of-range and malformed tokens are dropped silently: this is a confirmation
//! prompt, not a protocol boundary.

use std::collections::BTreeSet;

/// Ordered set of 1-based indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet(BTreeSet<usize>);

impl SelectionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all(max: usize) -> Self {
        Self((1..=max).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.0.contains(&idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Pick the selected items (1-based) from `items`, in index order.
    pub fn pick<'a, T>(&self, items: &'a [T]) -> Vec<&'a T> {
        self.iter()
            .filter_map(|i| i.checked_sub(1).and_then(|z| items.get(z)))
            .collect()
    }
}

impl FromIterator<usize> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub fn parse_selection(text: &str, max: usize) -> SelectionSet {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let lower = compact.to_ascii_lowercase();

    match lower.as_str() {
        "" | "none" | "q" | "quit" => return SelectionSet::empty(),
        "all" => return SelectionSet::all(max),
        _ => {}
    }

    let mut out = BTreeSet::new();
    for tok in lower.split(',') {
        if tok.is_empty() {
            continue;
        }
        if let Some((a, b)) = tok.split_once('-') {
            let (Ok(start), Ok(end)) = (a.parse::<usize>(), b.parse::<usize>()) else {
                continue;
            };
            if start > end {
                continue;
            }
            // диапазон обрезаем по [1, max], а не отбрасываем целиком
            let lo = start.max(1);
            let hi = end.min(max);
            out.extend(lo..=hi);
        } else if let Ok(n) = tok.parse::<usize>() {
            if (1..=max).contains(&n) {
                out.insert(n);
            }
        }
    }
    SelectionSet(out)
}
