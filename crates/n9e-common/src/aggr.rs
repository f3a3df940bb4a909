//! Aggregation views: group current events into cards keyed by
//! `field:<name>` / `tagkey:<name>` tokens joined with `::`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::types::AlertEvent;

/// Event fields an aggregation rule may reference.
pub const AGGR_FIELDS: [&str; 9] = [
    "cluster",
    "group_id",
    "group_name",
    "rule_id",
    "rule_name",
    "severity",
    "runbook_url",
    "target_ident",
    "target_note",
];

/// Rendered for any empty or missing component of a card title.
pub const NULL_COMPONENT: &str = "Null";

const KEY_SEPARATOR: &str = "::";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggrKey {
    Field(String),
    TagKey(String),
}

/// Parses and validates an aggregation rule string.
///
/// # Examples
///
/// ```
/// use n9e_common::aggr::{parse_aggr_rule, AggrKey};
///
/// let keys = parse_aggr_rule("field:severity::tagkey:service").unwrap();
/// assert_eq!(keys[0], AggrKey::Field("severity".into()));
/// assert_eq!(keys[1], AggrKey::TagKey("service".into()));
/// assert!(parse_aggr_rule("field:password").is_err());
/// ```
pub fn parse_aggr_rule(rule: &str) -> Result<Vec<AggrKey>, ValidationError> {
    let rule = rule.trim();
    if rule.is_empty() {
        return Err(ValidationError::new("rule", "aggregation rule is blank"));
    }

    rule.split(KEY_SEPARATOR)
        .map(|token| {
            let token = token.trim();
            let (kind, name) = token.split_once(':').ok_or_else(|| {
                ValidationError::new("rule", format!("token '{token}' is not kind:name"))
            })?;
            let name = name.trim();
            match kind.trim() {
                "field" if AGGR_FIELDS.contains(&name) => Ok(AggrKey::Field(name.to_string())),
                "field" => Err(ValidationError::new(
                    "rule",
                    format!("field '{name}' cannot be aggregated"),
                )),
                "tagkey" if !name.is_empty() => Ok(AggrKey::TagKey(name.to_string())),
                "tagkey" => Err(ValidationError::new("rule", "tagkey name is blank")),
                other => Err(ValidationError::new(
                    "rule",
                    format!("unknown key kind '{other}'"),
                )),
            }
        })
        .collect()
}

pub fn aggr_title(event: &AlertEvent, keys: &[AggrKey]) -> String {
    keys.iter()
        .map(|key| {
            let value = match key {
                AggrKey::Field(name) => event.field(name).unwrap_or_default(),
                AggrKey::TagKey(name) => event.tags.value_or_empty(name).to_string(),
            };
            if value.is_empty() {
                NULL_COMPONENT.to_string()
            } else {
                value
            }
        })
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// Convenience wrapper that validates `rule` before building the title.
pub fn aggr_title_for_rule(event: &AlertEvent, rule: &str) -> Result<String, ValidationError> {
    Ok(aggr_title(event, &parse_aggr_rule(rule)?))
}

/// One card of an aggregation view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggrCard {
    pub title: String,
    pub total: usize,
    /// Most severe (numerically lowest) severity among the grouped events.
    pub severity: i32,
    pub event_ids: Vec<i64>,
}

/// Groups events into cards ordered by title.
pub fn aggregate_cards(events: &[AlertEvent], keys: &[AggrKey]) -> Vec<AggrCard> {
    let mut cards: BTreeMap<String, AggrCard> = BTreeMap::new();
    for event in events {
        let title = aggr_title(event, keys);
        let card = cards.entry(title.clone()).or_insert_with(|| AggrCard {
            title,
            total: 0,
            severity: event.severity,
            event_ids: Vec::new(),
        });
        card.total += 1;
        card.severity = card.severity.min(event.severity);
        card.event_ids.push(event.id);
    }
    cards.into_values().collect()
}
