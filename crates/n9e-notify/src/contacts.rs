use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Resolves notify groups into concrete recipients for a channel.
pub trait ContactResolver: Send + Sync {
    /// Recipients for `channel` across `groups`, deduplicated, in group order.
    fn resolve(&self, channel: &str, groups: &[String]) -> Vec<String>;
}

/// Fixed contact book: user group id, then channel, then recipients.
///
/// ```toml
/// [notify.contacts."7"]
/// email = ["ops@example.com"]
/// phone = ["13800000000"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticContacts {
    groups: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl StaticContacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, group: &str, channel: &str, recipient: &str) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .entry(channel.to_string())
            .or_default()
            .push(recipient.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl From<BTreeMap<String, BTreeMap<String, Vec<String>>>> for StaticContacts {
    fn from(groups: BTreeMap<String, BTreeMap<String, Vec<String>>>) -> Self {
        Self { groups }
    }
}

impl ContactResolver for StaticContacts {
    fn resolve(&self, channel: &str, groups: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        groups
            .iter()
            .filter_map(|g| self.groups.get(g))
            .filter_map(|channels| channels.get(channel))
            .flatten()
            .filter(|r| seen.insert(*r))
            .cloned()
            .collect()
    }
}
