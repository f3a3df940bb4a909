use xxhash_rust::xxh3::Xxh3;

use crate::labels::LabelSet;

/// Stable identity of one alerting stream: `rule_id` plus its label set.
///
/// Keys and values are length-prefixed before hashing, so no byte inside a
/// label can be confused with a boundary. The label set is key-ordered, so
/// insertion order never matters. Output is 32 lowercase hex characters.
///
/// # Examples
///
/// ```
/// use n9e_common::fingerprint::fingerprint;
/// use n9e_common::labels::LabelSet;
///
/// let a: LabelSet = [("a", "1"), ("b", "2")].into_iter().collect();
/// let b: LabelSet = [("b", "2"), ("a", "1")].into_iter().collect();
/// assert_eq!(fingerprint(42, &a), fingerprint(42, &b));
/// assert_ne!(fingerprint(42, &a), fingerprint(43, &a));
/// assert_eq!(fingerprint(42, &a).len(), 32);
/// ```
pub fn fingerprint(rule_id: i64, labels: &LabelSet) -> String {
    format!("{:032x}", labels_hasher(rule_id, labels).digest128())
}

/// [`fingerprint`] of a point that may carry its own severity.
///
/// Points of one rule with equal labels but different severities are
/// separate streams. A severity of 0 hashes exactly like [`fingerprint`].
pub fn point_fingerprint(rule_id: i64, labels: &LabelSet, severity: i32) -> String {
    if severity == 0 {
        return fingerprint(rule_id, labels);
    }
    let mut hasher = labels_hasher(rule_id, labels);
    hasher.update(b"severity");
    hasher.update(&severity.to_le_bytes());
    format!("{:032x}", hasher.digest128())
}

fn labels_hasher(rule_id: i64, labels: &LabelSet) -> Xxh3 {
    let mut hasher = Xxh3::new();
    hasher.update(&rule_id.to_le_bytes());
    hasher.update(&(labels.len() as u64).to_le_bytes());
    for (key, value) in labels.iter() {
        write_part(&mut hasher, key);
        write_part(&mut hasher, value);
    }
    hasher
}

fn write_part(hasher: &mut Xxh3, part: &str) {
    hasher.update(&(part.len() as u64).to_le_bytes());
    hasher.update(part.as_bytes());
}
