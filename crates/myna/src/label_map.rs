//! An ordered label -> value multimap used by records and rows.
//!
//! Entries keep their insertion order and duplicate labels are allowed; row
//! unification relies on both properties.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    pub label: String,
    pub val: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap<T> {
    entries: Vec<Entry<T>>,
}

impl<T> Default for LabelMap<T> {
    fn default() -> Self {
        LabelMap { entries: Vec::new() }
    }
}

impl<T> LabelMap<T> {
    pub fn new() -> LabelMap<T> {
        LabelMap::default()
    }

    pub fn singleton(label: impl Into<String>, val: T) -> LabelMap<T> {
        LabelMap {
            entries: vec![Entry { label: label.into(), val }],
        }
    }

    pub fn from_entries(entries: Vec<(String, T)>) -> LabelMap<T> {
        LabelMap {
            entries: entries
                .into_iter()
                .map(|(label, val)| Entry { label, val })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Entry<T>] {
        &self.entries
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|entry| &entry.val)
    }

    pub fn push(&mut self, label: impl Into<String>, val: T) {
        self.entries.push(Entry { label: label.into(), val });
    }

    pub fn put(mut self, label: &str, vals: Vec<T>) -> LabelMap<T> {
        for val in vals {
            self.entries.push(Entry { label: label.to_string(), val });
        }
        self
    }

    /// Appends all entries of `other`, keeping duplicates.
    pub fn merge(mut self, other: LabelMap<T>) -> LabelMap<T> {
        self.entries.extend(other.entries);
        self
    }

    pub fn map_values<R>(&self, mut f: impl FnMut(&T) -> R) -> LabelMap<R> {
        LabelMap {
            entries: self
                .entries
                .iter()
                .map(|entry| Entry {
                    label: entry.label.clone(),
                    val: f(&entry.val),
                })
                .collect(),
        }
    }

    pub fn map_values_result<R, E>(
        &self,
        mut f: impl FnMut(&T) -> Result<R, E>,
    ) -> Result<LabelMap<R>, E> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            entries.push(Entry {
                label: entry.label.clone(),
                val: f(&entry.val)?,
            });
        }
        Ok(LabelMap { entries })
    }

    pub fn show(&self, mut f: impl FnMut(&str, &T) -> String) -> String {
        self.entries
            .iter()
            .map(|entry| f(&show_label(&entry.label), &entry.val))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Labels that look like plain identifiers print bare, anything else quoted.
pub fn show_label(label: &str) -> String {
    static LABEL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = LABEL_REGEX.get_or_init(|| Regex::new(r"^[a-z](?:\w+|_)*$").expect("label regex"));
    if regex.is_match(label) {
        label.to_string()
    } else {
        format!("\"{label}\"")
    }
}

/// Groups the entries by label, sorted by label; per-label values keep their
/// insertion order.
pub fn concat_label_map<T: Clone>(lm: &LabelMap<T>) -> Vec<(String, Vec<T>)> {
    let mut entries: Vec<&Entry<T>> = lm.entries().iter().collect();
    entries.sort_by(|a, b| a.label.cmp(&b.label));

    let mut res: Vec<(String, Vec<T>)> = Vec::with_capacity(entries.len());
    for entry in entries {
        match res.last_mut() {
            Some((label, vals)) if *label == entry.label => vals.push(entry.val.clone()),
            _ => res.push((entry.label.clone(), vec![entry.val.clone()])),
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_sorts_labels_and_keeps_value_order() {
        let lm = LabelMap::from_entries(vec![
            ("c".to_string(), 1),
            ("b".to_string(), 2),
            ("c".to_string(), 3),
            ("a".to_string(), 5),
            ("a".to_string(), 4),
        ]);
        let res = concat_label_map(&lm);

        assert_eq!(res.len(), 3);
        assert_eq!(res[0], ("a".to_string(), vec![5, 4]));
        assert_eq!(res[1], ("b".to_string(), vec![2]));
        assert_eq!(res[2], ("c".to_string(), vec![1, 3]));
    }

    #[test]
    fn concat_round_trips_stay_sorted() {
        let lm = LabelMap::from_entries(vec![
            ("b".to_string(), 1),
            ("a".to_string(), 2),
        ]);
        let once = concat_label_map(&lm);
        let again: LabelMap<i32> = LabelMap::from_entries(
            once.iter()
                .flat_map(|(label, vals)| vals.iter().map(move |v| (label.clone(), *v)))
                .collect(),
        );
        let twice = concat_label_map(&again);
        assert_eq!(once, twice);
    }

    #[test]
    fn show_label_quotes_non_identifiers() {
        assert_eq!(show_label("name"), "name");
        assert_eq!(show_label("first name"), "\"first name\"");
        assert_eq!(show_label("Upper"), "\"Upper\"");
    }
}
