//! Flat multi-value option bag shared by every transformer.

use std::collections::BTreeMap;

use url::form_urlencoded;

/// String-keyed options; a key may carry several values (e.g. `password`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    values: BTreeMap<String, Vec<String>>,
}

impl TransformOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a query-string style option (`k=v&k2=v2`). Keys present in
    /// `query` replace any previous values.
    pub fn merge_query(&mut self, query: &str) {
        let mut parsed: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            parsed
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        self.values.extend(parsed);
    }

    /// First value of `key`, or `""`.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.values
            .get(key)
            .and_then(|values| values.first())
            .map_or("", String::as_str)
    }

    /// All values of `key`.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Replaces every value of `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), vec![value.into()]);
    }

    /// Appends a value to `key` unless already present.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let values = self.values.entry(key.into()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    /// `true` when `key` is `"1"`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == "1"
    }
}
