use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ValidationError;
use crate::labels::LabelSet;

/// A tag filter as stored in the `tags` JSON column of mutes and
/// subscriptions: `{"key": "...", "func": "==", "value": ...}`.
///
/// Older rows carry the operator under `op` instead of `func`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagFilterSpec {
    pub key: String,
    #[serde(default)]
    pub func: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub op: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl TagFilterSpec {
    pub fn new(key: &str, func: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.to_string(),
            func: func.to_string(),
            op: String::new(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Equal(String),
    NotEqual(String),
    Regex(Regex),
    NotRegex(Regex),
    In(HashSet<String>),
    NotIn(HashSet<String>),
}

/// A tag filter with its regex compiled and its value set tokenized.
#[derive(Debug, Clone)]
pub struct TagFilter {
    key: String,
    matcher: Matcher,
}

impl TagFilter {
    pub fn compile(spec: &TagFilterSpec) -> Result<Self, ValidationError> {
        let key = spec.key.trim();
        if key.is_empty() {
            return Err(ValidationError::new("tags", "tag filter key is blank"));
        }
        let func = if spec.func.trim().is_empty() {
            spec.op.trim()
        } else {
            spec.func.trim()
        };

        let matcher = match func {
            "==" => Matcher::Equal(scalar(&spec.value)),
            "!=" => Matcher::NotEqual(scalar(&spec.value)),
            "=~" => Matcher::Regex(compile_regex(key, &spec.value)?),
            "!~" => Matcher::NotRegex(compile_regex(key, &spec.value)?),
            "in" => Matcher::In(value_set(key, &spec.value)?),
            "not in" => Matcher::NotIn(value_set(key, &spec.value)?),
            other => {
                return Err(ValidationError::new(
                    "tags",
                    format!("unsupported func '{other}' for key '{key}'"),
                ))
            }
        };

        Ok(Self {
            key: key.to_string(),
            matcher,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// A missing key is compared as the empty string.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        let value = labels.value_or_empty(&self.key);
        match &self.matcher {
            Matcher::Equal(v) => value == v,
            Matcher::NotEqual(v) => value != v,
            Matcher::Regex(re) => re.is_match(value),
            Matcher::NotRegex(re) => !re.is_match(value),
            Matcher::In(set) => set.contains(value),
            Matcher::NotIn(set) => !set.contains(value),
        }
    }
}

pub fn compile_all(specs: &[TagFilterSpec]) -> Result<Vec<TagFilter>, ValidationError> {
    specs.iter().map(TagFilter::compile).collect()
}

pub fn matches_all(filters: &[TagFilter], labels: &LabelSet) -> bool {
    filters.iter().all(|f| f.matches(labels))
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn compile_regex(key: &str, value: &serde_json::Value) -> Result<Regex, ValidationError> {
    let pattern = scalar(value);
    Regex::new(&pattern).map_err(|e| {
        ValidationError::new("tags", format!("invalid regex for key '{key}': {e}"))
    })
}

fn value_set(key: &str, value: &serde_json::Value) -> Result<HashSet<String>, ValidationError> {
    match value {
        serde_json::Value::String(s) => Ok(s.split_whitespace().map(str::to_string).collect()),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(s) => Ok(s.clone()),
                serde_json::Value::Number(n) => Ok(n.to_string()),
                _ => Err(ValidationError::new(
                    "tags",
                    format!("value set for key '{key}' must hold strings or numbers"),
                )),
            })
            .collect(),
        _ => Err(ValidationError::new(
            "tags",
            format!("value set for key '{key}' must be a string or an array"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels() -> LabelSet {
        [("service", "api"), ("env", "prod")].into_iter().collect()
    }

    #[test]
    fn equality_and_missing_keys() {
        let eq = TagFilter::compile(&TagFilterSpec::new("service", "==", "api")).unwrap();
        assert!(eq.matches(&labels()));

        let ne = TagFilter::compile(&TagFilterSpec::new("region", "!=", "eu")).unwrap();
        assert!(ne.matches(&labels()));

        let empty = TagFilter::compile(&TagFilterSpec::new("region", "==", "")).unwrap();
        assert!(empty.matches(&labels()));
    }

    #[test]
    fn regex_is_compiled_once() {
        let re = TagFilter::compile(&TagFilterSpec::new("env", "=~", "^pro")).unwrap();
        assert!(re.matches(&labels()));
        let nre = TagFilter::compile(&TagFilterSpec::new("env", "!~", "^pro")).unwrap();
        assert!(!nre.matches(&labels()));

        let err = TagFilter::compile(&TagFilterSpec::new("env", "=~", "(")).unwrap_err();
        assert!(err.reason.contains("invalid regex"));
    }

    #[test]
    fn in_sets_accept_strings_and_arrays() {
        let tokens = TagFilter::compile(&TagFilterSpec::new("env", "in", "dev  prod")).unwrap();
        assert!(tokens.matches(&labels()));

        let array =
            TagFilter::compile(&TagFilterSpec::new("code", "not in", json!(["500", 502]))).unwrap();
        let mut l = labels();
        l.insert("code", "502");
        assert!(!array.matches(&l));
        l.insert("code", "404");
        assert!(array.matches(&l));
    }

    #[test]
    fn legacy_op_field_and_bad_input() {
        let spec: TagFilterSpec =
            serde_json::from_str(r#"{"key":"env","op":"==","value":"prod"}"#).unwrap();
        assert!(TagFilter::compile(&spec).unwrap().matches(&labels()));

        assert!(TagFilter::compile(&TagFilterSpec::new(" ", "==", "x")).is_err());
        assert!(TagFilter::compile(&TagFilterSpec::new("env", "~=", "x")).is_err());
        assert!(TagFilter::compile(&TagFilterSpec::new("env", "in", json!({"a": 1}))).is_err());
    }
}
