use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator between `k=v` pairs in the stored form of a label set.
pub const TAG_SEPARATOR: &str = ",,";

/// A canonical, key-ordered label set.
///
/// The stored form is `k1=v1,,k2=v2`. [`LabelSet::decode`] and
/// [`LabelSet::encode`] are the only places that string is produced or
/// parsed. `\` escapes `,` and `\` everywhere and `=` inside keys, so any
/// key or value survives a store and load unchanged.
///
/// # Examples
///
/// ```
/// use n9e_common::labels::LabelSet;
///
/// let labels = LabelSet::decode("b=2,, a=1,,broken");
/// assert_eq!(labels.get("a"), Some("1"));
/// assert_eq!(labels.len(), 2);
/// assert_eq!(labels.encode(), "a=1,,b=2");
///
/// let odd: LabelSet = [("msg", "a,,b")].into_iter().collect();
/// assert_eq!(odd.encode(), r"msg=a\,\,b");
/// assert_eq!(LabelSet::decode(&odd.encode()), odd);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the stored form. Keys are trimmed, values are kept verbatim.
    /// Pairs without `=` or with an empty key are skipped. A `\` that does
    /// not precede `,`, `=` or `\` is taken literally.
    pub fn decode(raw: &str) -> Self {
        let mut map = BTreeMap::new();
        let mut key = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            let buf = if in_value { &mut value } else { &mut key };
            match c {
                '\\' => match chars.peek() {
                    Some(&next @ (',' | '=' | '\\')) => {
                        buf.push(next);
                        chars.next();
                    }
                    _ => buf.push(c),
                },
                ',' if chars.peek() == Some(&',') => {
                    chars.next();
                    flush_pair(&mut map, &mut key, &mut value, in_value);
                    in_value = false;
                }
                '=' if !in_value => in_value = true,
                _ => buf.push(c),
            }
        }
        flush_pair(&mut map, &mut key, &mut value, in_value);
        Self(map)
    }

    pub fn encode(&self) -> String {
        self.pairs().join(TAG_SEPARATOR)
    }

    /// Escaped `k=v` strings in key order.
    pub fn pairs(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|(k, v)| {
                let mut pair = String::with_capacity(k.len() + v.len() + 1);
                escape_into(&mut pair, k, true);
                pair.push('=');
                escape_into(&mut pair, v, false);
                pair
            })
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Missing keys read as the empty string, which is what tag filters
    /// compare against.
    pub fn value_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

fn flush_pair(
    map: &mut BTreeMap<String, String>,
    key: &mut String,
    value: &mut String,
    had_equals: bool,
) {
    let k = key.trim();
    if had_equals && !k.is_empty() {
        map.insert(k.to_string(), std::mem::take(value));
    }
    key.clear();
    value.clear();
}

fn escape_into(out: &mut String, raw: &str, is_key: bool) {
    for c in raw.chars() {
        if matches!(c, ',' | '\\') || (is_key && c == '=') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for LabelSet {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.0.insert(k.into(), v.into());
        }
    }
}
